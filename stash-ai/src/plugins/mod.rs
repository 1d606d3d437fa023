//! Domain plug-ins
//!
//! Each content type the service can import implements [`ModelPlugin`]. The
//! import pipeline only ever holds an `Arc<dyn ModelPlugin>`.

pub mod skin;

pub use skin::SkinPlugin;

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveReader;
use crate::error::{ImportError, ImportResult};
use crate::models::{ImportParameters, Model, StoredFile};
use crate::store::FileStore;

/// Capability interface implemented once per content type
#[async_trait]
pub trait ModelPlugin: Send + Sync + 'static {
    /// Short type name used in logs and notifications (e.g. "skin")
    fn model_name(&self) -> &str;

    /// Extensions (case-insensitive, dot optional) whose bytes make up the
    /// model's fingerprint
    fn hashable_file_extensions(&self) -> &[&str];

    /// Build a bare model from the archive. `Ok(None)` skips the archive
    /// without counting it as a failure.
    fn create_model(
        &self,
        archive: &dyn ArchiveReader,
        parameters: &ImportParameters,
    ) -> anyhow::Result<Option<Model>>;

    /// Fill in domain fields. Runs inside the import transaction after every
    /// archive file is staged; may rewrite or add file usages.
    async fn populate(
        &self,
        model: &mut Model,
        archive: &dyn ArchiveReader,
        ctx: &mut PopulateContext<'_>,
    ) -> anyhow::Result<()>;

    /// Extra gate on the batch-mode fast path, consulted after a fast-hash
    /// match. Filename-set and blob-presence checks are applied regardless.
    fn can_skip_import(&self, _existing: &Model, _candidate: &Model) -> bool {
        true
    }

    /// Authoritative reuse check after population
    fn can_reuse_existing(&self, existing: &Model, candidate: &Model) -> bool {
        existing.file_signature() == candidate.file_signature()
    }

    /// Whether a successfully imported source may be removed from disk
    fn should_delete_archive(&self, _path: &Path) -> bool {
        false
    }

    /// Runs inside the commit transaction, after the model row is inserted
    async fn post_import(&self, _model: &Model, _conn: &mut SqliteConnection) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handles available to [`ModelPlugin::populate`]
pub struct PopulateContext<'a> {
    conn: &'a mut SqliteConnection,
    store: &'a FileStore,
    cancel: &'a CancellationToken,
}

impl<'a> PopulateContext<'a> {
    pub fn new(
        conn: &'a mut SqliteConnection,
        store: &'a FileStore,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { conn, store, cancel }
    }

    /// Connection of the import transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        self.conn
    }

    pub fn store(&self) -> &FileStore {
        self.store
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Checkpoint for long-running population logic
    pub fn check_cancelled(&self) -> ImportResult<()> {
        if self.cancel.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Read a staged file's content. Intended for small definition files.
    pub async fn read_file(&self, model: &Model, filename: &str) -> ImportResult<Option<Vec<u8>>> {
        let Some(usage) = model.file(filename) else {
            return Ok(None);
        };

        let store = self.store.clone();
        let storage_path = usage.file.storage_path();
        let bytes = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut bytes = Vec::new();
            store.get_stream(&storage_path)?.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
        .await??;

        Ok(Some(bytes))
    }

    /// Store `bytes` and bind them to `filename`, replacing any existing usage
    pub async fn write_file(
        &self,
        model: &mut Model,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ImportResult<StoredFile> {
        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.add_bytes(&bytes)).await??;

        model.set_file(filename, stored.clone());
        Ok(stored)
    }
}
