use clap::{Parser, Subcommand};
use std::path::PathBuf;

use satoshi_qa::commands::{ask, chat, export, ingest, show_config, status};
use satoshi_qa::config::Config;
use satoshi_qa::{QaError, Result};

#[derive(Parser)]
#[command(name = "satoshi-qa")]
#[command(about = "Ask questions against the Satoshi Nakamoto archive, with cited sources")]
#[command(version)]
struct Cli {
    /// Data directory holding the config file and vector index
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from a directory of scraped archive pages
    Ingest {
        /// Directory containing emails/, posts/, and quotes/ subdirectories
        source_dir: PathBuf,
        /// Also dump every chunk to this CSV file
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },
    /// Dump extracted chunks to CSV without touching the index
    Export {
        /// Directory containing emails/, posts/, and quotes/ subdirectories
        source_dir: PathBuf,
        /// CSV file to write
        output: PathBuf,
    },
    /// Ask a single question
    Ask {
        question: String,
    },
    /// Start an interactive multi-turn chat
    Chat,
    /// Show service and index status
    Status,
    /// Manage configuration
    Config {
        /// Show current configuration instead of writing a config file
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Config::default_base_dir().map_err(|e| QaError::Config(e.to_string()))?,
    };
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Ingest {
            source_dir,
            export_csv,
        } => {
            ingest(&config, &source_dir, export_csv.as_deref()).await?;
        }
        Commands::Export { source_dir, output } => {
            export(&config, &source_dir, &output)?;
        }
        Commands::Ask { question } => {
            ask(&config, &question).await?;
        }
        Commands::Chat => {
            chat(&config).await?;
        }
        Commands::Status => {
            status(&config).await?;
        }
        Commands::Config { show } => {
            show_config(&config, show)?;
        }
    }

    Ok(())
}
