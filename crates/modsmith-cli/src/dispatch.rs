use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use modsmith_core::{
    Action, ActionKind, InstallMode, InstallerConfig, PackageManifest, PathContext, ThemeEntry,
    DEFAULT_CONFIG_FILE, DEFAULT_THEME_ID,
};
use modsmith_installer::{
    append_run_journal_entry, claim_active_run, clear_active_run, copy_dir_recursive,
    current_unix_timestamp, default_state_root, plan_actions, plan_fingerprint, run_actions,
    update_run_status, write_run_metadata, CursorStep, HistoryEntry, InstallState,
    InstallationCursor, LocalPermissions, PackageHistory, PatchEnvironment, PlanRequest,
    ReceiptHistory, RunJournalEntry, RunMetadata, RunOptions, RunReport, StateLayout,
};
use tracing::{info, warn};

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::render::{format_action_line, format_history_line, format_step_lines, Console};
use crate::{Cli, Commands, PackageArgs};

pub(crate) const MANIFEST_FILE: &str = "package-info.toml";

/// Runs one command. `Ok(false)` means the command ran but recorded failures.
pub(crate) fn run_cli(cli: Cli) -> Result<bool> {
    match &cli.command {
        Commands::Plan { package } => {
            let session = Session::open(&cli)?;
            let planned = session.plan(package)?;
            print_plan(&planned, package.json)?;
            Ok(true)
        }
        Commands::Test { package } => {
            let session = Session::open(&cli)?;
            let planned = session.plan(package)?;
            let report = run_actions(
                &planned.actions,
                session.env(&planned),
                &session.history,
                session.run_options(&planned, true),
            );
            print_report(&report, &planned, package.json)?;
            Ok(!report.failed)
        }
        Commands::Apply {
            package,
            expect_fingerprint,
        } => {
            let session = Session::open(&cli)?;
            let planned = session.plan(package)?;
            apply_package(&session, &planned, expect_fingerprint.as_deref(), package.json)
        }
        Commands::History { id } => {
            let layout = resolve_layout(cli.state_root.as_deref())?;
            print_history(&layout, id.as_deref())?;
            Ok(true)
        }
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_completion_shell(*shell, shell_env.as_deref(), cfg!(windows));
            write_completions_script(shell, &mut io::stdout().lock())?;
            Ok(true)
        }
    }
}

pub(crate) fn resolve_layout(state_root: Option<&Path>) -> Result<StateLayout> {
    let root = match state_root {
        Some(root) => root.to_path_buf(),
        None => default_state_root()?,
    };
    let layout = StateLayout::new(root);
    layout.ensure_base_dirs()?;
    Ok(layout)
}

struct Session {
    config: InstallerConfig,
    themes: Vec<ThemeEntry>,
    settings_path: PathBuf,
    layout: StateLayout,
    history: ReceiptHistory,
}

pub(crate) struct PlannedPackage {
    pub(crate) manifest: PackageManifest,
    pub(crate) mode: InstallMode,
    pub(crate) paths: PathContext,
    pub(crate) actions: Vec<Action>,
    pub(crate) fingerprint: String,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let config = InstallerConfig::load(&config_path)?;
        let layout = resolve_layout(cli.state_root.as_deref())?;

        Ok(Self {
            themes: config.themes(),
            settings_path: config.settings_path(),
            history: ReceiptHistory::new(layout.clone()),
            config,
            layout,
        })
    }

    fn plan(&self, args: &PackageArgs) -> Result<PlannedPackage> {
        let (manifest, staging_dir) = stage_package(&self.layout, &args.package)?;
        let mode = InstallMode::from(args.mode);
        let previous =
            previous_version(&self.history, &manifest.id, mode, args.previous.as_deref())?;
        let paths = self.config.path_context(&staging_dir);

        let request = PlanRequest {
            mode,
            product_version: &self.config.product_version,
            previous_version: previous.as_deref(),
            staging_dir: &staging_dir,
        };
        let actions = plan_actions(&manifest, &request, &paths, &LocalPermissions)?;
        let fingerprint = plan_fingerprint(&actions)?;

        Ok(PlannedPackage {
            manifest,
            mode,
            paths,
            actions,
            fingerprint,
        })
    }

    fn env<'a>(&'a self, planned: &'a PlannedPackage) -> PatchEnvironment<'a> {
        PatchEnvironment {
            paths: &planned.paths,
            themes: &self.themes,
            settings_path: Some(&self.settings_path),
            make_backups: self.config.make_backups,
            permissions: &LocalPermissions,
        }
    }

    fn run_options(&self, planned: &PlannedPackage, testing: bool) -> RunOptions {
        RunOptions {
            mode: planned.mode,
            testing,
            language: self.config.language.clone(),
        }
    }
}

/// Copies the package into its staging dir and parses its manifest.
pub(crate) fn stage_package(
    layout: &StateLayout,
    package_dir: &Path,
) -> Result<(PackageManifest, PathBuf)> {
    let manifest_path = package_dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path).with_context(|| {
        format!(
            "failed to read package manifest: {}",
            manifest_path.display()
        )
    })?;
    let manifest = PackageManifest::from_toml_str(&raw)
        .with_context(|| format!("invalid package manifest: {}", manifest_path.display()))?;

    let staging_dir = layout.package_staging_path(&manifest.id);
    if staging_dir.exists() {
        fs::remove_dir_all(&staging_dir).with_context(|| {
            format!(
                "failed to clear staging directory: {}",
                staging_dir.display()
            )
        })?;
    }
    copy_dir_recursive(package_dir, &staging_dir)?;
    info!(package = %manifest.id, staging = %staging_dir.display(), "staged package");

    Ok((manifest, staging_dir))
}

/// Baseline for `from` checks: explicit, else the installed version on upgrade.
pub(crate) fn previous_version(
    history: &dyn PackageHistory,
    package_id: &str,
    mode: InstallMode,
    explicit: Option<&str>,
) -> Result<Option<String>> {
    if let Some(explicit) = explicit {
        return Ok(Some(explicit.trim().to_string()));
    }
    if mode != InstallMode::Upgrade {
        return Ok(None);
    }
    Ok(history.lookup(package_id)?.map(|entry| entry.version))
}

fn apply_package(
    session: &Session,
    planned: &PlannedPackage,
    expected_fingerprint: Option<&str>,
    json: bool,
) -> Result<bool> {
    if let Some(expected) = expected_fingerprint {
        if !expected.trim().eq_ignore_ascii_case(&planned.fingerprint) {
            return Err(anyhow!(
                "plan fingerprint mismatch: expected {}, planned {}",
                expected.trim(),
                planned.fingerprint
            ));
        }
    }

    let started_at_unix = current_unix_timestamp()?;
    let run_id = format!("run-{started_at_unix}-{}", std::process::id());
    claim_active_run(&session.layout, &run_id)?;

    let outcome = run_claimed(session, planned, &run_id, started_at_unix);
    let cleared = clear_active_run(&session.layout);
    let report = outcome?;
    cleared?;

    print_report(&report, planned, json)?;
    Ok(!report.failed)
}

fn run_claimed(
    session: &Session,
    planned: &PlannedPackage,
    run_id: &str,
    started_at_unix: u64,
) -> Result<RunReport> {
    write_run_metadata(
        &session.layout,
        &RunMetadata {
            version: 1,
            run_id: run_id.to_string(),
            package_id: planned.manifest.id.clone(),
            mode: planned.mode.as_str().to_string(),
            status: "running".to_string(),
            started_at_unix,
            fingerprint: Some(planned.fingerprint.clone()),
        },
    )?;

    let report = match execute_plan(session, planned, run_id) {
        Ok(report) => report,
        Err(err) => {
            if let Err(status_err) = update_run_status(&session.layout, run_id, "failed") {
                warn!(run_id, error = %format!("{status_err:#}"), "could not mark run as failed");
            }
            return Err(err);
        }
    };

    let status = if report.failed { "failed" } else { "done" };
    update_run_status(&session.layout, run_id, status)?;
    if !report.failed {
        record_history(session, planned, &report, started_at_unix)?;
    }
    info!(run_id, status, "finished package run");
    Ok(report)
}

fn execute_plan(session: &Session, planned: &PlannedPackage, run_id: &str) -> Result<RunReport> {
    let mut progress = Console::detect().step_progress(
        planned.mode,
        &planned.manifest.id,
        planned.actions.len(),
    );
    let mut cursor = InstallationCursor::new(
        &planned.actions,
        session.env(planned),
        &session.history,
        session.run_options(planned, false),
    );

    let mut steps = Vec::new();
    let mut seq = 1_u64;
    while let CursorStep::Action(step) = cursor.next() {
        for result in &step.results {
            let appended = append_run_journal_entry(
                &session.layout,
                run_id,
                &RunJournalEntry {
                    seq,
                    action: step.kind.as_str().to_string(),
                    target: result.target.clone(),
                    status: result.status.as_str().to_string(),
                },
            );
            if let Err(err) = appended {
                progress.abandon();
                return Err(err);
            }
            seq += 1;
        }
        progress.advance(&step);
        steps.push(step);
    }
    progress.finish();

    Ok(RunReport {
        steps,
        failed: cursor.failed(),
        chmod_paths: cursor.chmod_paths().to_vec(),
        deferred: cursor.deferred().to_vec(),
        themes_touched: cursor.themes_touched(),
    })
}

fn record_history(
    session: &Session,
    planned: &PlannedPackage,
    report: &RunReport,
    installed_at_unix: u64,
) -> Result<()> {
    let state = match planned.mode {
        InstallMode::Uninstall => InstallState::Uninstalled,
        InstallMode::Install | InstallMode::Upgrade => InstallState::Installed,
    };
    let mut themes_installed = vec![DEFAULT_THEME_ID];
    themes_installed.extend(report.themes_touched.iter().copied());
    themes_installed.sort_unstable();
    themes_installed.dedup();

    session.history.record(&HistoryEntry {
        package_id: planned.manifest.id.clone(),
        name: planned.manifest.name.clone(),
        version: planned.manifest.version.clone(),
        themes_installed,
        db_changes: report
            .deferred
            .iter()
            .filter(|action| action.kind == ActionKind::Database)
            .map(|action| action.filename.clone())
            .collect(),
        state,
        installed_at_unix,
    })
}

fn print_plan(planned: &PlannedPackage, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::json!({
            "package": planned.manifest.id,
            "mode": planned.mode,
            "fingerprint": planned.fingerprint,
            "actions": planned.actions,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to encode plan")?
        );
        return Ok(());
    }

    let console = Console::detect();
    console.section(&format!("{} {}", planned.mode, planned.manifest.id));
    let lines = planned
        .actions
        .iter()
        .enumerate()
        .map(|(index, action)| format_action_line(index, action, &planned.paths))
        .collect::<Vec<_>>();
    console.lines(&lines);
    println!("fingerprint: {}", planned.fingerprint);
    Ok(())
}

fn print_report(report: &RunReport, planned: &PlannedPackage, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::json!({
            "package": planned.manifest.id,
            "mode": planned.mode,
            "fingerprint": planned.fingerprint,
            "report": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to encode run report")?
        );
        return Ok(());
    }

    let console = Console::detect();
    console.section("Results");
    for step in &report.steps {
        console.lines(&format_step_lines(step, console.style()));
    }

    if !report.chmod_paths.is_empty() {
        console.section("Permissions");
        for path in &report.chmod_paths {
            console.status(
                "warn",
                &format!("needs write permission: {}", planned.paths.display_relative(path)),
            );
        }
    }
    if !report.deferred.is_empty() {
        console.section("Deferred");
        for action in &report.deferred {
            console.status(
                "info",
                &format!("{} {}", action.kind.as_str(), action.filename),
            );
        }
    }

    let summary = format!("{} {}", planned.mode, planned.manifest.id);
    if report.failed {
        console.status("err", &format!("{summary} failed"));
    } else {
        console.status("ok", &format!("{summary} passed"));
    }
    println!("fingerprint: {}", planned.fingerprint);
    Ok(())
}

fn print_history(layout: &StateLayout, id: Option<&str>) -> Result<()> {
    let entries = ReceiptHistory::new(layout.clone())
        .entries()?
        .into_iter()
        .filter(|entry| id.is_none_or(|id| entry.package_id == id))
        .collect::<Vec<_>>();

    if entries.is_empty() {
        match id {
            Some(id) => println!("No history for package: {id}"),
            None => println!("No packages recorded"),
        }
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_history_line(entry));
    }
    Ok(())
}
