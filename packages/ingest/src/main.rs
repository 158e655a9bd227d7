#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crime report ingest pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use safezone_cli_utils::{IndicatifProgress, init_logger};
use safezone_extract::Extractor;
use safezone_extract::classifier::classify;
use safezone_ingest::config::PipelineConfig;
use safezone_ingest::{RunOptions, run};
use safezone_source::retry::RetryPolicy;

#[derive(Parser)]
#[command(name = "safezone_ingest", about = "Crime report ingest pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new reports, resolve them, and publish new crime records
    Run {
        /// Pipeline config file (TOML). Uses built-in defaults if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Resolve everything but do not write the datastore
        #[arg(long)]
        dry_run: bool,
    },
    /// Resolve a single piece of text and print how it was resolved
    Resolve {
        /// Report text
        text: String,
        /// Topic label to classify alongside the text
        #[arg(long)]
        topic: Option<String>,
        /// Pipeline config file (TOML), for the resolver and gazetteer settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Reshape the government crime statistics CSV into per-district records
    Gov {
        /// Input CSV path or `http(s)://` URL
        #[arg(long)]
        input: String,
        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
        /// Download attempts for URL inputs
        #[arg(long, default_value = "3")]
        attempts: u32,
    },
    /// Validate the gazetteer and print its contents
    Gazetteer {
        /// Pipeline config file (TOML), for the gazetteer path
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print every state and district
        #[arg(long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, dry_run } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let progress = IndicatifProgress::reports_bar(&multi, "Resolving reports");
            let summary = run(&config, RunOptions { dry_run }, progress).await?;
            log::info!("{summary}");
        }
        Commands::Resolve {
            text,
            topic,
            config,
        } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let gazetteer = Arc::new(config.gazetteer.load()?);
            let extractor = Extractor::new(gazetteer, config.resolver, config.filter);
            let trace = extractor.resolver().trace(&text);

            println!("normalized: {}", trace.normalized);
            println!("state:      {}", trace.location.state);
            println!("district:   {}", trace.location.district);
            println!(
                "strategy:   {}",
                trace
                    .strategy
                    .map_or_else(|| "default".to_string(), |s| s.to_string())
            );
            if let Some(topic) = topic {
                println!("crime:      {}", classify(&topic));
            }
        }
        Commands::Gov {
            input,
            output,
            attempts,
        } => {
            let policy = RetryPolicy {
                attempts,
                ..RetryPolicy::default()
            };
            let rows = safezone_gov::io::load(&input, policy).await?;
            let records = safezone_gov::reshape(&rows, &safezone_gov::RenameTable::default());
            safezone_gov::io::save(&output, &records)?;
        }
        Commands::Gazetteer { config, list } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let gazetteer = config.gazetteer.load()?;

            println!(
                "{} states, {} districts, {} aliases",
                gazetteer.states().count(),
                gazetteer.districts().count(),
                gazetteer.aliases().len()
            );

            if list {
                for state in gazetteer.states() {
                    println!("{state}");
                    for district in gazetteer
                        .districts()
                        .filter(|d| gazetteer.owner_state(d) == Some(state))
                    {
                        println!("  {district}");
                    }
                }
            }
        }
    }

    Ok(())
}
