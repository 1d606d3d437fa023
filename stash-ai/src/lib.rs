//! stash-ai library interface
//!
//! Archive ingest: reads archives, stores their files by content, and
//! commits one deduplicated catalog record per archive. Exposed as a library
//! for the binary and for integration testing.

pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod plugins;
pub mod services;
pub mod store;
pub mod utils;

pub use crate::error::{ImportError, ImportResult};

use std::path::Path;
use std::sync::Arc;

use stash_common::config::{RootLayout, TomlConfig};
use stash_common::events::EventBus;

use crate::config::ImportConfig;
use crate::db::Catalog;
use crate::plugins::ModelPlugin;
use crate::services::ArchiveImporter;
use crate::store::FileStore;

/// Open the catalog and file store under `root` and build an importer for `plugin`
///
/// Creates the directory layout and schema on first use.
pub async fn open_importer(
    root: &Path,
    toml_config: &TomlConfig,
    plugin: Arc<dyn ModelPlugin>,
    event_bus: Option<EventBus>,
) -> ImportResult<ArchiveImporter> {
    let layout = RootLayout::new(root);
    layout.ensure_directories()?;

    let pool = stash_common::db::init_database(&layout.database_path()).await?;
    let config = ImportConfig::resolve(&pool, toml_config).await?;
    let catalog = Catalog::new(pool).with_max_lock_wait_ms(config.max_lock_wait_ms);
    let store = FileStore::open(layout.files_path())?;

    let importer = ArchiveImporter::new(plugin, catalog, store, config);
    Ok(match event_bus {
        Some(bus) => importer.with_event_bus(bus),
        None => importer,
    })
}
