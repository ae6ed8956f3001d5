use clap::{Parser, Subcommand};
use semindex::Result;
use semindex::commands::{
    check_index, optimize_index, prune_index, query_index, reset_index, show_config, show_status,
    sync_paths,
};
use semindex::config::{Config, get_config_dir};
use semindex::embeddings::FileType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "semindex")]
#[command(about = "Incremental semantic index over files on disk")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the index (defaults to $SEMINDEX_HOME or ~/.semindex)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index new and changed files
    Sync {
        /// Files or directories to sync
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Re-index files even when their content is unchanged
        #[arg(long)]
        force: bool,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the index
    Query {
        text: String,
        /// Maximum number of results
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
        /// Only return chunks of this type: markdown, code or text
        #[arg(long)]
        file_type: Option<FileType>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show index statistics and embedding service health
    Status,
    /// Check that the manifest and vector store agree
    Check {
        /// Remove orphaned vectors and forget drifted files
        #[arg(long)]
        repair: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget indexed files that no longer exist
    Prune,
    /// Compact the vector store and vacuum the manifest
    Optimize,
    /// Delete everything from the index
    Reset,
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to config.toml
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = get_config_dir(cli.config_dir.as_deref())
        .map_err(|e| semindex::IndexError::Config(e.to_string()))?;
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Sync { paths, force, json } => {
            sync_paths(&config, &paths, force, json).await?;
        }
        Commands::Query {
            text,
            limit,
            file_type,
            json,
        } => {
            query_index(&config, &text, limit, file_type, json).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Check { repair, json } => {
            check_index(&config, repair, json).await?;
        }
        Commands::Prune => {
            prune_index(&config).await?;
        }
        Commands::Optimize => {
            optimize_index(&config).await?;
        }
        Commands::Reset => {
            reset_index(&config).await?;
        }
        Commands::Config { init } => {
            show_config(&config, init)?;
        }
    }

    Ok(())
}
