//! CLI Commands
//!
//! Command definitions for the `smartdoor` tool.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use door_core::logging::LogFormat;

/// Smart door command line tool
#[derive(Parser, Debug)]
#[command(name = "smartdoor")]
#[command(version)]
#[command(about = "Blockchain-gated smart door tooling")]
#[command(long_about = "Inspect smart door configuration, manage the event \
    reconciliation watermark store and run a scripted simulation of the door \
    protocol against an in-memory ledger.")]
pub struct Cli {
    /// Watermark store directory (env: SMARTDOOR_WATERMARK_PATH)
    #[arg(long, env = "SMARTDOOR_WATERMARK_PATH")]
    pub watermark_path: Option<PathBuf>,

    /// Output format (json, plain)
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,

    /// Log format (pretty, json, compact)
    #[arg(long, default_value = "compact", value_parser = parse_log_format)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse()
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text
    #[default]
    Plain,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolved configuration and whether it is valid
    Config {
        /// Read a configKeys.json file instead of the environment
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Inspect or modify reconciliation watermarks
    #[command(subcommand)]
    Watermark(WatermarkCommands),

    /// Run a scripted door scenario on an in-memory ledger
    Simulate,
}

/// Watermark commands
#[derive(Subcommand, Debug)]
pub enum WatermarkCommands {
    /// Show stored watermarks
    Show {
        /// Only this contract
        #[arg(long)]
        contract: Option<String>,
    },

    /// Forget the watermark; the next run starts after the current head
    Reset {
        /// Contract address
        #[arg(long)]
        contract: String,
    },

    /// Set the next block to process
    Set {
        /// Block number
        block: u64,

        /// Contract address
        #[arg(long)]
        contract: String,

        /// Allow moving the watermark backwards (events will be re-applied)
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watermark_set() {
        let cli = Cli::try_parse_from([
            "smartdoor",
            "-vv",
            "watermark",
            "set",
            "42",
            "--contract",
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "--force",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watermark(WatermarkCommands::Set { block, force, .. }) => {
                assert_eq!(block, 42);
                assert!(force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_log_format() {
        let cli = Cli::try_parse_from(["smartdoor", "--log-format", "json", "simulate"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(Cli::try_parse_from(["smartdoor", "--log-format", "xml", "simulate"]).is_err());
    }
}
