//! Duplicate detection against the catalog
//!
//! Two decision points: a batch-mode fast path taken right after the fast
//! hash, and the authoritative check taken inside the commit transaction
//! once population has settled the model's files.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::db::{models, Catalog};
use crate::error::ImportResult;
use crate::models::Model;
use crate::plugins::ModelPlugin;
use crate::store::FileStore;

/// Authoritative decision for a populated candidate
#[derive(Debug)]
pub enum Resolution {
    /// No record shares the candidate's hash
    New,
    /// Same files as an existing record; hand that one back instead
    Reuse(Model),
    /// Same hash but different files; the existing record gets superseded
    Supersede(Model),
}

#[derive(Clone)]
pub struct DuplicateResolver {
    catalog: Catalog,
    store: FileStore,
    plugin: Arc<dyn ModelPlugin>,
}

impl DuplicateResolver {
    pub fn new(catalog: Catalog, store: FileStore, plugin: Arc<dyn ModelPlugin>) -> Self {
        Self {
            catalog,
            store,
            plugin,
        }
    }

    /// Best record for `hash`; active records win over soft-deleted ones
    pub async fn find_existing(&self, hash: &str) -> ImportResult<Option<Model>> {
        Ok(self.catalog.find_existing(hash).await?)
    }

    /// Batch-mode shortcut: an existing record that can be handed back
    /// without staging or populating `candidate`
    ///
    /// Requires the plug-in's consent, an identical filename set and every
    /// referenced blob present on disk.
    pub async fn fast_path(
        &self,
        fast_hash: &str,
        archive_filenames: &[String],
        candidate: &Model,
    ) -> ImportResult<Option<Model>> {
        let Some(existing) = self.find_existing(fast_hash).await? else {
            return Ok(None);
        };

        if !self.plugin.can_skip_import(&existing, candidate) {
            return Ok(None);
        }

        if !filenames_match(&existing, archive_filenames) {
            tracing::debug!(
                model_id = %existing.id,
                "Fast hash matched but filename sets differ"
            );
            return Ok(None);
        }

        if !self.all_files_exist(&existing) {
            tracing::warn!(
                model_id = %existing.id,
                "Fast hash matched but stored files are missing"
            );
            return Ok(None);
        }

        Ok(Some(existing))
    }

    /// Authoritative check, run on the commit transaction's connection
    pub async fn resolve(&self, conn: &mut SqliteConnection, candidate: &Model) -> ImportResult<Resolution> {
        let Some(existing) = models::find_by_hash(conn, &candidate.hash).await? else {
            return Ok(Resolution::New);
        };

        if self.plugin.can_reuse_existing(&existing, candidate) {
            Ok(Resolution::Reuse(existing))
        } else {
            Ok(Resolution::Supersede(existing))
        }
    }

    fn all_files_exist(&self, model: &Model) -> bool {
        model
            .files
            .iter()
            .all(|usage| self.store.exists(&usage.file.storage_path()))
    }
}

/// Ordinal comparison of a model's filenames against an archive listing
pub fn filenames_match(model: &Model, archive_filenames: &[String]) -> bool {
    let mut archive_sorted: Vec<&str> = archive_filenames.iter().map(String::as_str).collect();
    archive_sorted.sort_unstable();
    model.sorted_filenames() == archive_sorted
}
