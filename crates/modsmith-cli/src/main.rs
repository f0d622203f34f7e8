use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use modsmith_core::InstallMode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "modsmith")]
#[command(about = "Installs, upgrades and removes board packages", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    state_root: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the actions a package would run.
    Plan {
        #[command(flatten)]
        package: PackageArgs,
    },
    /// Dry-run a package against the board and print the plan fingerprint.
    Test {
        #[command(flatten)]
        package: PackageArgs,
    },
    /// Run a package against the board.
    Apply {
        #[command(flatten)]
        package: PackageArgs,
        #[arg(long)]
        expect_fingerprint: Option<String>,
    },
    History {
        id: Option<String>,
    },
    Completions {
        #[arg(value_enum)]
        shell: Option<CliCompletionShell>,
    },
}

#[derive(Args, Debug, Clone)]
struct PackageArgs {
    #[arg(long)]
    package: PathBuf,
    #[arg(long, value_enum, default_value_t = CliMode::Install)]
    mode: CliMode,
    #[arg(long)]
    previous: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliMode {
    Install,
    Upgrade,
    Uninstall,
}

impl From<CliMode> for InstallMode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Install => InstallMode::Install,
            CliMode::Upgrade => InstallMode::Upgrade,
            CliMode::Uninstall => InstallMode::Uninstall,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch::run_cli(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests;
