mod checkpoint;
mod config;
mod error;
mod models;
mod pipeline;
mod planner;
mod storage;
mod transform;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::checkpoint::CheckpointState;
use crate::config::AppConfig;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "xetra-etl", about = "Daily Xetra trading report ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML or YAML)
    #[arg(short, long, global = true, env = "XETRA_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Extract unprocessed dates, write the daily report, update the checkpoint
    Run {
        /// Run the whole job but keep every write in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Show which dates the next run would extract, as JSON
    Plan,

    /// Show checkpoint log statistics
    Checkpoint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "xetra_etl=info,warn",
        1 => "xetra_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let first_date = config.source.first_extract_date.clone();

    match cli.command {
        Command::Run { dry_run } => {
            let pipeline = if dry_run {
                Pipeline::dry_run(config)?
            } else {
                Pipeline::new(config)
            };
            info!("Xetra ETL job started");
            let stats = pipeline.run()?;
            info!(
                "Xetra ETL job finished: {} dates, {} files, {} records, {} report rows -> {}",
                stats.dates_extracted,
                stats.files_read,
                utils::fmt_number(stats.records_read),
                utils::fmt_number(stats.report_rows),
                stats.report_key.as_deref().unwrap_or("(nothing written)"),
            );
        }

        Command::Plan => {
            let pipeline = Pipeline::new(config);
            let state = pipeline.read_checkpoint()?;
            let plan = planner::plan(&first_date, &state)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Command::Checkpoint => match Pipeline::new(config).read_checkpoint()? {
            CheckpointState::NotFound => {
                println!("No checkpoint log yet — run `xetra-etl run` first.");
            }
            CheckpointState::Found(log) => {
                let dates = log.processed_dates();
                let show = |d: Option<&chrono::NaiveDate>| {
                    d.map(|d| d.to_string()).unwrap_or_else(|| "—".into())
                };
                println!("─────────────────────────────────");
                println!("  Xetra ETL — Checkpoint");
                println!("─────────────────────────────────");
                println!("  Entries        : {}", utils::fmt_number(log.len()));
                println!("  Distinct dates : {}", utils::fmt_number(dates.len()));
                println!("  From           : {}", show(dates.first()));
                println!("  To             : {}", show(dates.last()));
                println!(
                    "  Last run       : {}",
                    log.last_processed_at()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "—".into())
                );
                println!("─────────────────────────────────");
            }
        },
    }

    Ok(())
}
