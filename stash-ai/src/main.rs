//! stash-ai - Archive ingest command line
//!
//! Imports skin archives (folders or loose files) into the catalog under the
//! root folder, and lists what the catalog holds.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stash_common::config::{default_config_path, load_toml_config, resolve_root_folder};
use stash_common::events::{EventBus, StashEvent};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stash_ai::models::{ImportParameters, ImportTask};
use stash_ai::plugins::SkinPlugin;
use stash_ai::services::EventBusSink;
use stash_ai::ImportError;

/// Command-line arguments for stash-ai
#[derive(Parser, Debug)]
#[command(name = "stash-ai")]
#[command(about = "Archive ingest for the stash catalog")]
#[command(version)]
struct Args {
    /// Root folder holding the catalog and file store
    #[arg(short, long, env = "STASH_ROOT")]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to ~/.config/stash/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import archives
    Import {
        /// Folders or files to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Enable batch-mode duplicate shortcuts
        #[arg(long)]
        batch: bool,

        /// Ignore the pause gate
        #[arg(long)]
        immediate: bool,

        /// Hard-link files into the store instead of copying
        #[arg(long)]
        hard_links: bool,

        /// Delete source archives that imported successfully
        #[arg(long)]
        delete_source: bool,
    },

    /// List catalog records
    List {
        /// Include soft-deleted records
        #[arg(long)]
        include_deleted: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load config")?,
        None => Default::default(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting stash-ai {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    info!("Root folder: {}", root_folder.display());

    let event_bus = EventBus::new(256);
    let importer = stash_ai::open_importer(
        &root_folder,
        &toml_config,
        Arc::new(SkinPlugin::new()),
        Some(event_bus.clone()),
    )
    .await
    .context("Failed to open catalog")?;

    match args.command {
        Command::Import {
            paths,
            batch,
            immediate,
            hard_links,
            delete_source,
        } => {
            let tasks: Vec<ImportTask> = paths
                .iter()
                .map(|path| {
                    ImportTask::from_path(path)
                        .delete_on_import(delete_source)
                        .prefer_hard_links(hard_links)
                })
                .collect();
            let parameters = ImportParameters {
                batch,
                import_immediately: immediate,
                prefer_hard_links: hard_links,
            };

            let renderer = tokio::spawn(render_events(event_bus.subscribe()));

            let cancel = CancellationToken::new();
            let ctrl_c = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, cancelling import");
                        cancel.cancel();
                    }
                })
            };

            let sink = Arc::new(EventBusSink::new(event_bus.clone()));
            let result = importer
                .import_tasks_with_progress(tasks, parameters, sink, &cancel)
                .await;

            ctrl_c.abort();
            drop(importer);
            drop(event_bus);
            let _ = renderer.await;

            match result {
                Ok(models) => {
                    for model in &models {
                        println!("{}  {}  {}", model.id, model.hash, model.name);
                    }
                }
                Err(ImportError::Cancelled) => {
                    anyhow::bail!("Import cancelled");
                }
                Err(e) => return Err(e).context("Import failed"),
            }
        }

        Command::List { include_deleted } => {
            let models = importer
                .catalog()
                .all_models(include_deleted)
                .await
                .context("Failed to read catalog")?;

            for model in &models {
                let marker = if model.delete_pending { " (deleted)" } else { "" };
                println!(
                    "{}  {}  {}  {} files{}",
                    model.id,
                    model.hash,
                    model.name,
                    model.files.len(),
                    marker
                );
            }
            info!("{} records", models.len());
        }
    }

    Ok(())
}

/// Log progress events until the bus closes
async fn render_events(mut rx: tokio::sync::broadcast::Receiver<StashEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(StashEvent::ImportProgress {
                text,
                progress,
                state,
                ..
            }) => {
                info!(state = ?state, "[{:>3.0}%] {}", progress * 100.0, text);
            }
            Ok(StashEvent::ModelImported { name, reused, .. }) => {
                if reused {
                    info!("Already in catalog: {}", name);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress renderer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
