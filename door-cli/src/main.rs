//! smartdoor entry point
//!
//! Configuration is loaded from environment variables (via .env file).
//! Command-line arguments override environment variables.

use clap::Parser;
use door_cli::{handler, Cli};
use door_core::logging::{init_logging, LogConfig, LogLevel};

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig {
        level: if cli.verbose == 0 {
            LogLevel::Warn
        } else {
            LogLevel::from_verbosity(cli.verbose - 1)
        },
        format: cli.log_format,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = handler::run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
