//! Transactional model catalog

use std::sync::Arc;

use sqlx::SqlitePool;
use stash_common::Result;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models;
use crate::models::Model;
use crate::utils::{begin_monitored, retry_on_lock, MonitoredTransaction};

/// Default bound for retrying small writes that hit "database is locked"
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Catalog handle. Cheap to clone; clones share the pool and write lock.
///
/// Every mutation goes through [`Catalog::begin_write`], which serialises
/// writers in-process so an import's file registration, model insertion
/// and supersession land as one unit.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    max_lock_wait_ms: u64,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction holding the catalog write lock
    pub async fn begin_write(&self, caller: &'static str) -> Result<MonitoredTransaction> {
        begin_monitored(&self.pool, Some(self.write_lock.clone()), caller).await
    }

    /// Duplicate lookup outside any transaction
    pub async fn find_existing(&self, hash: &str) -> Result<Option<Model>> {
        let mut conn = self.pool.acquire().await?;
        models::find_by_hash(&mut conn, hash).await
    }

    pub async fn load_model(&self, id: Uuid) -> Result<Option<Model>> {
        let mut conn = self.pool.acquire().await?;
        models::load_model(&mut conn, id).await
    }

    /// Clear the soft-delete flag on a record about to be handed back as an
    /// import result. No-op for active records.
    pub async fn undelete_for_reuse(&self, model: &mut Model) -> Result<()> {
        if !model.delete_pending {
            return Ok(());
        }

        self.write_delete_pending(model.id, false).await?;
        model.delete_pending = false;

        tracing::debug!(model_id = %model.id, name = %model.name, "Undeleted model for reuse");
        Ok(())
    }

    /// Soft-delete a model. Returns false if it does not exist.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        self.write_delete_pending(id, true).await
    }

    async fn write_delete_pending(&self, id: Uuid, pending: bool) -> Result<bool> {
        let catalog = self;
        retry_on_lock("catalog delete_pending", self.max_lock_wait_ms, move || async move {
            let mut tx = catalog.begin_write("catalog::set_delete_pending").await?;
            let updated = models::set_delete_pending(tx.conn()?, id, pending).await?;
            tx.commit().await?;
            Ok(updated)
        })
        .await
    }

    pub async fn count_models(&self, include_deleted: bool) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        models::count_models(&mut conn, include_deleted).await
    }

    pub async fn all_models(&self, include_deleted: bool) -> Result<Vec<Model>> {
        let mut conn = self.pool.acquire().await?;
        models::load_all_models(&mut conn, include_deleted).await
    }

    pub async fn count_stored_files(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        models::count_stored_files(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredFile;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Catalog) {
        let temp_dir = TempDir::new().unwrap();
        let pool = stash_common::db::init_database(&temp_dir.path().join("stash.db"))
            .await
            .unwrap();
        (temp_dir, Catalog::new(pool))
    }

    async fn insert(catalog: &Catalog, model: &Model) {
        let mut tx = catalog.begin_write("test::insert").await.unwrap();
        models::insert_model(tx.conn().unwrap(), model).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_undelete_for_reuse() {
        let (_temp_dir, catalog) = setup().await;

        let mut model = Model::new("pack");
        model.hash = "h".to_string();
        model.set_file("a.ini", StoredFile::new("aa", 1));
        insert(&catalog, &model).await;

        assert!(catalog.soft_delete(model.id).await.unwrap());
        let mut found = catalog.find_existing("h").await.unwrap().unwrap();
        assert!(found.delete_pending);

        catalog.undelete_for_reuse(&mut found).await.unwrap();
        assert!(!found.delete_pending);

        let reloaded = catalog.load_model(model.id).await.unwrap().unwrap();
        assert!(!reloaded.delete_pending);
        assert_eq!(catalog.count_models(false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_write_is_invisible() {
        let (_temp_dir, catalog) = setup().await;

        let mut model = Model::new("pending");
        model.hash = "h".to_string();
        {
            let mut tx = catalog.begin_write("test::uncommitted").await.unwrap();
            models::insert_model(tx.conn().unwrap(), &model).await.unwrap();
            tx.rollback().await.unwrap();
        }

        assert!(catalog.find_existing("h").await.unwrap().is_none());
        assert_eq!(catalog.count_models(true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_missing_model() {
        let (_temp_dir, catalog) = setup().await;
        assert!(!catalog.soft_delete(Uuid::new_v4()).await.unwrap());
    }
}
