use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use finq::config::{load_config, Config};
use finq::engine::Engine;

#[derive(Parser)]
#[command(name = "finq", version, about = "Financial document Q&A with live market context")]
struct Cli {
    /// Path to the TOML config file; defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "./config/finq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents and report what was indexed.
    Ingest {
        /// Directory to ingest; defaults to documents.dir from the config.
        dir: Option<PathBuf>,
    },
    /// Ingest the configured documents, then answer one question.
    Ask {
        query: String,
        /// Emit the full answer as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Ingest the configured documents, then print corpus counters.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        Config::minimal()
    };

    match cli.command {
        Commands::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| config.documents.dir.clone());
            let engine = Engine::from_config(config).await?;
            let report = engine.ingest_dir(&dir).await?;
            println!(
                "Ingested {} file(s) ({} chunks), skipped {}, evicted {}",
                report.ingested, report.chunks, report.skipped, report.evicted
            );
        }
        Commands::Ask { query, json } => {
            let docs_dir = config.documents.dir.clone();
            let engine = Engine::from_config(config).await?;
            if docs_dir.is_dir() {
                engine.ingest_dir(&docs_dir).await?;
            }
            let answer = engine.answer(&query).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text);
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for source in &answer.sources {
                        println!("  - {}", source.label);
                    }
                }
                if answer.used_fallback {
                    println!();
                    println!("(answer generated without the language model)");
                }
            }
        }
        Commands::Stats => {
            let docs_dir = config.documents.dir.clone();
            let engine = Engine::from_config(config).await?;
            if docs_dir.is_dir() {
                engine.ingest_dir(&docs_dir).await?;
            }
            let stats = engine.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
