//! # Cairn CLI
//!
//! Admin command line for a file-backed manifest repository.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cairn_core::{
    config::{Config, LogFormat, LoggingConfig},
    utils::{format_bytes, parse_label},
    ContentStore, Labels, ManifestId,
};
use cairn_storage::{ContentManager, FileBlobStorage, Manager, ManagerOptions};

#[derive(Parser)]
#[command(name = "cairn")]
#[command(version, about = "Cairn - labeled manifest index for content-addressed repositories")]
struct Cli {
    /// Repository directory (overrides `store.root`)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Store a new manifest and print its ID
    Put {
        /// Label as key=value; `type` is required
        #[arg(long = "label", value_parser = label_arg, required = true)]
        labels: Vec<(String, String)>,
        /// Payload as JSON
        #[arg(long)]
        data: String,
    },
    /// Print a manifest payload
    Get { id: String },
    /// Print manifest metadata
    Show { id: String },
    /// List manifests carrying every given label
    Find {
        #[arg(long = "label", value_parser = label_arg)]
        labels: Vec<(String, String)>,
    },
    /// Delete manifests
    Rm {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Consolidate all manifest blocks into one
    Compact,
}

fn label_arg(arg: &str) -> std::result::Result<(String, String), String> {
    parse_label(arg).ok_or_else(|| format!("expected key=value, got {:?}", arg))
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

struct Repository {
    content: Arc<ContentManager>,
    manager: Manager,
}

impl Repository {
    async fn open(config: &Config) -> Result<Self> {
        let blobs = FileBlobStorage::open(&config.store.root, config.store.sync_writes)
            .await
            .with_context(|| format!("opening repository at {}", config.store.root.display()))?;
        let content = Arc::new(ContentManager::new(Arc::new(blobs)));
        let manager = Manager::new(
            content.clone(),
            ManagerOptions::from_config(&config.manifest),
        );
        Ok(Self { content, manager })
    }

    /// Persist manifest changes, then the content store underneath them
    async fn commit(&self) -> Result<()> {
        let written = self.manager.flush().await?;
        self.content.flush().await?;
        debug!("Committed {} manifest records", written);
        Ok(())
    }
}

fn to_labels(pairs: Vec<(String, String)>) -> Labels {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(repo) = cli.repo {
        config.store.root = repo;
    }
    init_logging(&config.logging);

    let repo = Repository::open(&config).await?;

    match cli.command {
        Commands::Put { labels, data } => {
            let payload: serde_json::Value =
                serde_json::from_str(&data).context("--data is not valid JSON")?;
            let id = repo.manager.put(to_labels(labels), &payload).await?;
            repo.commit().await?;
            println!("{}", id);
        }
        Commands::Get { id } => {
            let (payload, _) = repo.manager.get_raw(&ManifestId::from(id)).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Show { id } => {
            let metadata = repo.manager.get_metadata(&ManifestId::from(id)).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Commands::Find { labels } => {
            let found = repo.manager.find(&to_labels(labels)).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::Rm { ids } => {
            for id in ids {
                repo.manager.delete(&ManifestId::from(id)).await?;
            }
            repo.commit().await?;
        }
        Commands::Compact => {
            let result = repo.manager.compact().await?;
            repo.commit().await?;

            let snapshot = repo.manager.metrics().snapshot();
            let report = json!({
                "blocks_compacted": result.blocks_compacted,
                "blocks_deleted": result.blocks_deleted,
                "new_block": result.new_block.map(|id| id.to_string()),
                "entries_kept": result.entries_kept,
                "entries_dropped": result.entries_dropped,
                "tombstones_kept": result.tombstones_kept,
                "bytes_written": format_bytes(snapshot.bytes_written),
                "duration_ms": result.duration_ms,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
