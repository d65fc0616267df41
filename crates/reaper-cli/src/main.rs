//! # reaper entry point
//!
//! Parses command-line arguments, installs logging, resolves settings from
//! the environment and dispatches to the command handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use reaper_cli::commands::{run_cron, run_once, run_validate, EXIT_CONFIG};
use reaper_cli::logging::{self, LogFormat};
use reaper_cli::settings::Settings;

/// Finds EC2 instances that have run longer than their policy allows and
/// terminates them (or, in dry-run mode, reports what it would terminate).
#[derive(Parser, Debug)]
#[command(name = "reaper", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run one cycle and exit.
    Run {
        /// Simulate terminations regardless of DRY_RUN.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run cycles on SCHEDULE until interrupted.
    Cron,

    /// Load configuration and policies, print the plan, and exit.
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose);

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let command = cli.command.unwrap_or(Commands::Run { dry_run: false });
    let result = match command {
        Commands::Validate => run_validate(&settings, &mut std::io::stdout().lock()),
        Commands::Run { dry_run } => block_on(run_once(&settings, dry_run)),
        Commands::Cron => block_on(run_cron(&settings)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn block_on<F>(future: F) -> anyhow::Result<u8>
where
    F: std::future::Future<Output = anyhow::Result<u8>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["reaper"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn run_accepts_dry_run_flag() {
        let cli = Cli::try_parse_from(["reaper", "run", "--dry-run"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run { dry_run: true }));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["reaper", "cron", "-vv", "--log-format", "text"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Cron));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["reaper", "destroy"]).is_err());
    }
}
