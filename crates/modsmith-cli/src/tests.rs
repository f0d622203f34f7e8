use super::*;

use std::fs;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use modsmith_installer::{
    claim_active_run, read_active_run, InstallationResult, PackageHistory, ReceiptHistory,
    RenderedStep, ResultStatus, StateLayout,
};
use tempfile::TempDir;

use crate::completion::{resolve_completion_shell, write_completions_script, CliCompletionShell};
use crate::dispatch::{previous_version, run_cli};
use crate::render::{
    format_step_lines, render_status_line, render_tally_line, OutputStyle, StepTally,
};

const MANIFEST: &str = r#"
id = "demo:hello"
name = "Hello"
version = "1.0"

[[install]]
[[install.action]]
kind = "modification"
text = "install.toml"
[[install.action]]
kind = "require-file"
name = "hello.php"
destination = "$sourcedir"

[[uninstall]]
[[uninstall.action]]
kind = "modification"
text = "install.toml"
reverse = true
[[uninstall.action]]
kind = "remove-file"
name = "$sourcedir/hello.php"
"#;

const PATCH: &str = r#"
[[file]]
name = "$sourcedir/Post.php"

[[file.operation]]
add = "BETA"
[[file.operation.search]]
text = "beta"
"#;

struct Fixture {
    _dir: TempDir,
    config: PathBuf,
    state: PathBuf,
    package: PathBuf,
    board: PathBuf,
}

impl Fixture {
    fn new(patch: &str) -> Self {
        let dir = tempfile::tempdir().expect("must create temp dir");
        let board = dir.path().join("board");
        let state = dir.path().join("state");
        let package = dir.path().join("package");
        fs::create_dir_all(board.join("Sources")).expect("must create sources");
        fs::create_dir_all(board.join("Themes/default")).expect("must create theme");
        fs::create_dir_all(&package).expect("must create package dir");
        fs::write(board.join("Sources/Post.php"), "alpha\nbeta\n").expect("must seed board");
        fs::write(package.join("package-info.toml"), MANIFEST).expect("must write manifest");
        fs::write(package.join("install.toml"), patch).expect("must write patch");
        fs::write(package.join("hello.php"), "<?php\n").expect("must write payload");

        let config = dir.path().join("modsmith.toml");
        fs::write(
            &config,
            format!(
                "product_version = \"2.1.4\"\nboard_dir = '{}'\n",
                board.display()
            ),
        )
        .expect("must write config");

        Self {
            _dir: dir,
            config,
            state,
            package,
            board,
        }
    }

    fn cli(&self, command: &[&str]) -> Cli {
        let mut args = vec![
            "modsmith".to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
            "--state-root".to_string(),
            self.state.display().to_string(),
        ];
        args.extend(command.iter().map(|arg| arg.to_string()));
        args.push("--package".to_string());
        args.push(self.package.display().to_string());
        Cli::try_parse_from(args).expect("cli args must parse")
    }

    fn layout(&self) -> StateLayout {
        StateLayout::new(&self.state)
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.board.join(relative)).expect("must read board file")
    }

    fn exists(&self, relative: &str) -> bool {
        self.board.join(relative).exists()
    }
}

fn journal_files(runs_dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(runs_dir)
        .expect("must read runs dir")
        .map(|entry| entry.expect("must read entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "journal"))
        .collect()
}

#[test]
fn cli_parses_package_commands_and_global_flags() {
    let cli = Cli::try_parse_from([
        "modsmith",
        "-vv",
        "apply",
        "--package",
        "pkg",
        "--mode",
        "upgrade",
        "--previous",
        "1.0",
        "--expect-fingerprint",
        "abc",
    ])
    .expect("must parse");

    assert_eq!(cli.verbose, 2);
    match cli.command {
        Commands::Apply {
            package,
            expect_fingerprint,
        } => {
            assert_eq!(package.mode, CliMode::Upgrade);
            assert_eq!(package.previous.as_deref(), Some("1.0"));
            assert_eq!(expect_fingerprint.as_deref(), Some("abc"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_requires_package_for_plan() {
    let err = Cli::try_parse_from(["modsmith", "plan"]).expect_err("package is required");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "install demo:hello passed"),
        "install demo:hello passed"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "install demo:hello passed"),
        "[OK] install demo:hello passed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "needs write permission"),
        "[WARN] needs write permission"
    );
}

#[test]
fn step_lines_mark_theme_copies_and_failures() {
    let step = RenderedStep {
        index: 0,
        kind: modsmith_core::ActionKind::Modification,
        target: "install.toml".to_string(),
        description: String::new(),
        results: vec![
            InstallationResult::new(
                modsmith_core::ActionKind::Modification,
                "./Themes/dark/index.template.php",
                ResultStatus::Saved,
            )
            .with_theme(2),
            InstallationResult::new(
                modsmith_core::ActionKind::Modification,
                "./Sources/Post.php",
                ResultStatus::Missing,
            )
            .with_message("file not found"),
        ],
    };

    let lines = format_step_lines(&step, OutputStyle::Rich);

    assert_eq!(
        lines,
        vec![
            "[OK] modification ./Themes/dark/index.template.php: saved (theme 2)".to_string(),
            "[ERR] modification ./Sources/Post.php: missing: file not found".to_string(),
        ]
    );
}

#[test]
fn tally_buckets_results_by_tone() {
    let step = RenderedStep {
        index: 0,
        kind: modsmith_core::ActionKind::Modification,
        target: "install.toml".to_string(),
        description: String::new(),
        results: vec![
            InstallationResult::new(
                modsmith_core::ActionKind::Modification,
                "./Sources/Post.php",
                ResultStatus::Saved,
            ),
            InstallationResult::new(
                modsmith_core::ActionKind::Modification,
                "./Sources/Display.php",
                ResultStatus::Missing,
            ),
            InstallationResult::new(
                modsmith_core::ActionKind::Chmod,
                "./Sources",
                ResultStatus::ChmodNeeded,
            ),
        ],
    };
    let mut tally = StepTally::default();
    tally.record(&step);

    assert_eq!(
        tally,
        StepTally {
            steps: 1,
            ok: 1,
            warn: 1,
            failed: 1,
        }
    );
    assert_eq!(
        render_tally_line(OutputStyle::Plain, "install demo:hello", &tally, 2, None),
        None
    );
    let line = render_tally_line(OutputStyle::Rich, "install demo:hello", &tally, 2, None)
        .expect("rich output has a tally line");
    assert!(line.contains("1/2 actions: 1 ok, 1 warn"));
    assert!(line.contains("1 failed"));
}

#[test]
fn completion_shell_resolution_prefers_explicit_then_env() {
    assert_eq!(
        resolve_completion_shell(Some(CliCompletionShell::Fish), Some("/bin/zsh"), false),
        CliCompletionShell::Fish
    );
    assert_eq!(
        resolve_completion_shell(None, Some("/usr/bin/zsh"), false),
        CliCompletionShell::Zsh
    );
    assert_eq!(
        resolve_completion_shell(None, None, true),
        CliCompletionShell::Powershell
    );
    assert_eq!(
        resolve_completion_shell(None, Some("tcsh"), false),
        CliCompletionShell::Bash
    );
}

#[test]
fn completions_script_names_binary() {
    let mut output = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut output).expect("must generate");
    let script = String::from_utf8(output).expect("script must be utf-8");
    assert!(script.contains("modsmith"));
}

#[test]
fn test_command_leaves_board_untouched() {
    let fixture = Fixture::new(PATCH);

    let passed = run_cli(fixture.cli(&["test"])).expect("test must run");

    assert!(passed);
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nbeta\n");
    assert!(!fixture.exists("Sources/hello.php"));
    let history = ReceiptHistory::new(fixture.layout());
    assert_eq!(history.lookup("demo:hello").expect("must look up"), None);
}

#[test]
fn apply_installs_records_history_and_releases_lock() {
    let fixture = Fixture::new(PATCH);

    let passed = run_cli(fixture.cli(&["apply"])).expect("apply must run");

    assert!(passed);
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nBETA\n");
    assert_eq!(fixture.read("Sources/hello.php"), "<?php\n");

    let layout = fixture.layout();
    assert_eq!(read_active_run(&layout).expect("must read marker"), None);
    let history = ReceiptHistory::new(layout.clone());
    let entry = history
        .lookup("demo:hello")
        .expect("must look up")
        .expect("install must be recorded");
    assert_eq!(entry.version, "1.0");
    assert_eq!(entry.themes_installed, vec![1]);

    let journals = journal_files(&layout.runs_dir());
    assert_eq!(journals.len(), 1);
    let journal = fs::read_to_string(&journals[0]).expect("must read journal");
    assert_eq!(journal.lines().count(), 2);
}

#[test]
fn uninstall_reverts_modifications_and_marks_history() {
    let fixture = Fixture::new(PATCH);
    assert!(run_cli(fixture.cli(&["apply"])).expect("apply must run"));

    let passed =
        run_cli(fixture.cli(&["apply", "--mode", "uninstall"])).expect("uninstall must run");

    assert!(passed);
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nbeta\n");
    assert!(!fixture.exists("Sources/hello.php"));
    let history = ReceiptHistory::new(fixture.layout());
    assert_eq!(history.lookup("demo:hello").expect("must look up"), None);
    assert_eq!(history.entries().expect("must list").len(), 1);
}

#[test]
fn apply_rejects_mismatched_fingerprint() {
    let fixture = Fixture::new(PATCH);

    let err = run_cli(fixture.cli(&["apply", "--expect-fingerprint", "deadbeef"]))
        .expect_err("fingerprint mismatch must fail");

    assert!(err.to_string().contains("plan fingerprint mismatch"));
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nbeta\n");
    assert_eq!(
        read_active_run(&fixture.layout()).expect("must read marker"),
        None
    );
}

#[test]
fn apply_refuses_while_another_run_is_active() {
    let fixture = Fixture::new(PATCH);
    let layout = fixture.layout();
    claim_active_run(&layout, "run-other").expect("must seed marker");

    let err = run_cli(fixture.cli(&["apply"])).expect_err("active run must block apply");

    assert!(err.to_string().contains("run-other"));
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nbeta\n");
    assert_eq!(
        read_active_run(&layout).expect("must read marker"),
        Some("run-other".to_string())
    );
}

#[test]
fn failed_apply_reports_failure_without_recording_history() {
    let fixture = Fixture::new(&PATCH.replace("text = \"beta\"", "text = \"omega\""));

    let passed = run_cli(fixture.cli(&["apply"])).expect("apply must run");

    assert!(!passed);
    assert_eq!(fixture.read("Sources/Post.php"), "alpha\nbeta\n");
    let layout = fixture.layout();
    assert_eq!(read_active_run(&layout).expect("must read marker"), None);
    let history = ReceiptHistory::new(layout);
    assert_eq!(history.lookup("demo:hello").expect("must look up"), None);
}

#[test]
fn upgrade_baseline_comes_from_history_unless_given() {
    let fixture = Fixture::new(PATCH);
    assert!(run_cli(fixture.cli(&["apply"])).expect("apply must run"));
    let history = ReceiptHistory::new(fixture.layout());

    assert_eq!(
        previous_version(&history, "demo:hello", InstallMode::Upgrade, None)
            .expect("must resolve"),
        Some("1.0".to_string())
    );
    assert_eq!(
        previous_version(&history, "demo:hello", InstallMode::Upgrade, Some("0.9"))
            .expect("must resolve"),
        Some("0.9".to_string())
    );
    assert_eq!(
        previous_version(&history, "demo:hello", InstallMode::Install, None)
            .expect("must resolve"),
        None
    );
}
