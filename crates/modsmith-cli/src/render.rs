use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use modsmith_core::{Action, InstallMode, PathContext};
use modsmith_installer::{HistoryEntry, RenderedStep, ResultStatus};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

/// Writes command output in the detected [`OutputStyle`].
#[derive(Copy, Clone, Debug)]
pub(crate) struct Console {
    style: OutputStyle,
}

impl Console {
    pub(crate) fn detect() -> Self {
        Self {
            style: current_output_style(),
        }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn status(self, tone: &str, message: &str) {
        println!("{}", render_status_line(self.style, tone, message));
    }

    pub(crate) fn section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!();
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    /// Progress over the actions of one package run. Plain output gets no bar
    /// and no closing tally.
    pub(crate) fn step_progress(
        self,
        mode: InstallMode,
        package_id: &str,
        total: usize,
    ) -> StepProgress {
        let total = total as u64;
        let bar = (self.style == OutputStyle::Rich).then(|| {
            let bar = ProgressBar::new(total.max(1));
            if let Ok(template) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {prefix} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {wide_msg}",
            ) {
                bar.set_style(template.tick_chars(mode_tick_chars(mode)).progress_chars("=>-"));
            }
            bar.set_prefix(format!("{mode} {package_id}"));
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });

        StepProgress {
            style: self.style,
            label: format!("{mode} {package_id}"),
            total,
            tally: StepTally::default(),
            bar,
            started_at: Instant::now(),
        }
    }
}

/// Result counts of the steps walked so far, bucketed by [`result_tone`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct StepTally {
    pub(crate) steps: u64,
    pub(crate) ok: u64,
    pub(crate) warn: u64,
    pub(crate) failed: u64,
}

impl StepTally {
    pub(crate) fn record(&mut self, step: &RenderedStep) {
        self.steps += 1;
        for result in &step.results {
            match result_tone(result.status) {
                "ok" => self.ok += 1,
                "warn" => self.warn += 1,
                "err" => self.failed += 1,
                _ => {}
            }
        }
    }
}

pub(crate) struct StepProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    tally: StepTally,
    bar: Option<ProgressBar>,
    started_at: Instant,
}

impl StepProgress {
    pub(crate) fn advance(&mut self, step: &RenderedStep) {
        self.tally.record(step);
        if let Some(bar) = &self.bar {
            bar.set_position(self.tally.steps.min(self.total.max(1)));
            bar.set_message(format!("{} {}", step.kind.as_str(), step.target));
        }
    }

    pub(crate) fn finish(mut self) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        bar.finish_and_clear();
        if let Some(line) = render_tally_line(
            self.style,
            &self.label,
            &self.tally,
            self.total,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn abandon(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn result_tone(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Opened | ResultStatus::Saved | ResultStatus::Passed => "ok",
        ResultStatus::ChmodNeeded => "warn",
        ResultStatus::Failed | ResultStatus::Missing => "err",
        ResultStatus::Skipped | ResultStatus::Deferred => "info",
    }
}

/// One line per result of a rendered step.
pub(crate) fn format_step_lines(step: &RenderedStep, style: OutputStyle) -> Vec<String> {
    if step.results.is_empty() {
        return vec![render_status_line(
            style,
            "info",
            &format!("{} {}", step.kind.as_str(), step.target),
        )];
    }

    step.results
        .iter()
        .map(|result| {
            let mut message = format!(
                "{} {}: {}",
                step.kind.as_str(),
                result.target,
                result.status.as_str()
            );
            if result.is_custom_theme() {
                message.push_str(&format!(" (theme {})", result.theme_id));
            }
            if !result.operations.is_empty() {
                message.push_str(&format!(" [{} edits]", result.operations.len()));
            }
            if !result.message.is_empty() {
                message.push_str(&format!(": {}", result.message));
            }
            render_status_line(style, result_tone(result.status), &message)
        })
        .collect()
}

pub(crate) fn format_action_line(index: usize, action: &Action, paths: &PathContext) -> String {
    let target = match action.destination.as_deref() {
        Some(destination) => paths.display_relative(destination),
        None => action.filename.clone(),
    };
    let mut line = format!("{:>3}. {} {target}", index + 1, action.kind.as_str());
    if !action.description.is_empty() {
        line.push_str(&format!(" ({})", action.description));
    }
    line
}

pub(crate) fn format_history_line(entry: &HistoryEntry) -> String {
    let themes = entry
        .themes_installed
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{} {} {} themes={} installed_at={}",
        entry.package_id,
        entry.version,
        entry.state.as_str(),
        if themes.is_empty() { "-" } else { themes.as_str() },
        entry.installed_at_unix
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis())
}

fn mode_tick_chars(mode: InstallMode) -> &'static str {
    match mode {
        InstallMode::Install => ".oO@* ",
        InstallMode::Upgrade => "-=~* ",
        InstallMode::Uninstall => "\\|/- ",
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn failed_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Closing line of a rich run, e.g. `install demo:hello 2/2 actions: 3 ok, 0 warn, 0 failed`.
pub(crate) fn render_tally_line(
    style: OutputStyle,
    label: &str,
    tally: &StepTally,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let failed = format!("{} failed", HumanCount(tally.failed));
    let failed = if tally.failed > 0 {
        colorize(failed_style(), &failed)
    } else {
        failed
    };
    let suffix = elapsed
        .map(|value| format!(" in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} {}/{} actions: {} ok, {} warn, {failed}{suffix}",
        colorize(label_style(), label),
        HumanCount(tally.steps),
        HumanCount(total),
        HumanCount(tally.ok),
        HumanCount(tally.warn),
    ))
}
