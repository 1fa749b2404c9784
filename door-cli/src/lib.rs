//! Smart Door CLI
//!
//! # Usage
//!
//! ```text
//! smartdoor [OPTIONS] <COMMAND>
//!
//! Commands:
//!   config     Show the resolved configuration and whether it is valid
//!   watermark  Inspect or modify reconciliation watermarks
//!   simulate   Run a scripted door scenario on an in-memory ledger
//!
//! Options:
//!       --watermark-path <PATH>  Watermark store directory
//!   -f, --format <FORMAT>        Output format (json, plain) [default: plain]
//!       --log-format <FORMAT>    Log format (pretty, json, compact) [default: compact]
//!   -v, --verbose...             Increase log verbosity
//! ```
//!
//! Configuration comes from `SMARTDOOR_*` environment variables, optionally
//! loaded from a `.env` file.

pub mod commands;
pub mod error;
pub mod handler;
pub mod simulate;

pub use commands::{Cli, Commands, OutputFormat, WatermarkCommands};
pub use error::{CliError, CliResult};

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
