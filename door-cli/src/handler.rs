//! Command Handlers

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use door_core::types::Principal;
use door_core::DoorConfig;
use door_gate::{SledWatermarkStore, WatermarkStore};

use crate::commands::{Cli, Commands, OutputFormat, WatermarkCommands};
use crate::error::{CliError, CliResult};
use crate::simulate;

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Config { ref file } => handle_config(file.as_deref(), cli.format),
        Commands::Watermark(ref cmd) => {
            let path = cli
                .watermark_path
                .clone()
                .unwrap_or_else(|| DoorConfig::from_env().watermark_path);
            handle_watermark(&path, cmd, cli.format).await
        }
        Commands::Simulate => handle_simulate(cli.format).await,
    }
}

fn print_json<T: Serialize>(data: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

// ============================================================================
// config
// ============================================================================

#[derive(Serialize)]
struct ConfigReport {
    config: DoorConfig,
    valid: bool,
    problems: Option<String>,
}

fn load_config(file: Option<&Path>) -> CliResult<DoorConfig> {
    match file {
        Some(path) => {
            debug!("Reading {}", path.display());
            let json = std::fs::read_to_string(path)?;
            Ok(DoorConfig::from_keys_json(&json)?)
        }
        None => Ok(DoorConfig::from_env()),
    }
}

fn handle_config(file: Option<&Path>, format: OutputFormat) -> CliResult<()> {
    let config = load_config(file)?;
    let problems = config.validate().err().map(|e| e.to_string());
    let report = ConfigReport {
        config: config.redacted(),
        valid: problems.is_none(),
        problems,
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Plain => {
            let c = &report.config;
            println!("Smart Door Configuration");
            println!("========================");
            println!("RPC URL:          {}", c.rpc_url);
            println!("Chain ID:         {}", c.chain_id);
            println!("Contract:         {}", c.contract_address.as_deref().unwrap_or("-"));
            println!("Door address:     {}", c.door_address.as_deref().unwrap_or("-"));
            println!("Door key:         {}", c.door_private_key.as_deref().unwrap_or("-"));
            println!("Poll interval:    {}s", c.poll_interval_secs);
            println!("Retry backoff:    {}s", c.retry_backoff_secs);
            println!(
                "Receipt polling:  {} x {}ms",
                c.receipt_max_attempts, c.receipt_interval_millis
            );
            println!("Watermarks:       {}", c.watermark_path.display());
            println!("Spawn physical:   {}", c.spawn_only_physical);
            println!();
            match &report.problems {
                None => println!("Configuration is valid"),
                Some(p) => println!("Configuration is INVALID: {}", p),
            }
        }
    }

    match report.problems {
        None => Ok(()),
        Some(p) => Err(CliError::config(p)),
    }
}

// ============================================================================
// watermark
// ============================================================================

#[derive(Serialize)]
struct WatermarkEntry {
    contract: String,
    next_block: u64,
}

async fn handle_watermark(
    path: &Path,
    cmd: &WatermarkCommands,
    format: OutputFormat,
) -> CliResult<()> {
    let store = SledWatermarkStore::open(path)?;

    match cmd {
        WatermarkCommands::Show { contract } => {
            let entries: Vec<WatermarkEntry> = match contract {
                Some(raw) => {
                    let contract = Principal::parse(raw)?;
                    store
                        .load(&contract)
                        .await?
                        .map(|next_block| WatermarkEntry {
                            contract: contract.to_string(),
                            next_block,
                        })
                        .into_iter()
                        .collect()
                }
                None => store
                    .entries()
                    .await?
                    .into_iter()
                    .map(|(contract, next_block)| WatermarkEntry {
                        contract: contract.to_string(),
                        next_block,
                    })
                    .collect(),
            };
            match format {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Plain if entries.is_empty() => println!("No watermarks stored"),
                OutputFormat::Plain => {
                    for e in &entries {
                        println!("{}  next block {}", e.contract, e.next_block);
                    }
                }
            }
        }
        WatermarkCommands::Reset { contract } => {
            let contract = Principal::parse(contract)?;
            store.remove(&contract).await?;
            store.flush()?;
            info!("Watermark for {} reset", contract);
            println!("Watermark for {} removed", contract);
        }
        WatermarkCommands::Set {
            block,
            contract,
            force,
        } => {
            let contract = Principal::parse(contract)?;
            let current = store.load(&contract).await?;
            set_watermark(&store, &contract, current, *block, *force).await?;
            println!("Watermark for {} set to {}", contract, block);
        }
    }
    Ok(())
}

async fn set_watermark(
    store: &SledWatermarkStore,
    contract: &Principal,
    current: Option<u64>,
    block: u64,
    force: bool,
) -> CliResult<()> {
    if let Some(current) = current {
        if block < current && !force {
            return Err(CliError::invalid_arg(format!(
                "refusing to move watermark back from {} to {} without --force",
                current, block
            )));
        }
    }
    store.put(contract, block).await?;
    store.flush()?;
    info!("Watermark for {} set to {}", contract, block);
    Ok(())
}

// ============================================================================
// simulate
// ============================================================================

async fn handle_simulate(format: OutputFormat) -> CliResult<()> {
    let report = simulate::run().await?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Plain => {
            println!("Scenario");
            println!("========");
            for step in &report.steps {
                println!("  {}", step);
            }
            println!();
            println!("Access log");
            println!("==========");
            for line in &report.access_log {
                println!("  {}", line);
            }
            println!();
            println!("Spawned presences: {}", report.spawned.join(", "));
            if let Some(w) = report.watermark {
                println!("Next block to reconcile: {}", w);
            }
        }
    }
    Ok(())
}
