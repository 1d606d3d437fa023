//! Import fixtures: temporary catalog and store, a scriptable plug-in,
//! archive builders and a recording progress sink

use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tempfile::TempDir;

use stash_ai::archive::{ArchiveReader, MemoryArchiveReader};
use stash_ai::config::ImportConfig;
use stash_ai::db::Catalog;
use stash_ai::models::{ImportParameters, ImportTask, Model};
use stash_ai::plugins::{ModelPlugin, PopulateContext};
use stash_ai::services::{ArchiveImporter, ProgressNotification, ProgressSink};
use stash_ai::store::FileStore;
use stash_ai::ImportError;

/// Scriptable plug-in
///
/// Hashes `.ini` and `.json` files. Behaviour per archive name is set with
/// the builder methods before the plug-in is handed to an importer.
#[derive(Default)]
pub struct TestPlugin {
    decline: HashSet<String>,
    fail_populate: HashSet<String>,
    slow_populate: HashMap<String, Duration>,
    rewrite: HashMap<String, (String, Vec<u8>)>,
    rename: HashMap<String, String>,
    fail_post_import: HashSet<String>,
    populate_calls: AtomicUsize,
    populated: Mutex<Vec<String>>,
}

impl TestPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// `create_model` returns nothing for this archive
    pub fn declining(mut self, archive: &str) -> Self {
        self.decline.insert(archive.to_string());
        self
    }

    /// `populate` errors for this archive
    pub fn failing(mut self, archive: &str) -> Self {
        self.fail_populate.insert(archive.to_string());
        self
    }

    /// `populate` sleeps (cancellably) for this archive
    pub fn slow(mut self, archive: &str, delay: Duration) -> Self {
        self.slow_populate.insert(archive.to_string(), delay);
        self
    }

    /// `populate` writes `filename` with `bytes` for this archive
    pub fn rewriting(mut self, archive: &str, filename: &str, bytes: &[u8]) -> Self {
        self.rewrite
            .insert(archive.to_string(), (filename.to_string(), bytes.to_vec()));
        self
    }

    /// `populate` renames the model built from this archive
    pub fn renaming(mut self, archive: &str, model_name: &str) -> Self {
        self.rename.insert(archive.to_string(), model_name.to_string());
        self
    }

    /// `post_import` errors for models with this name
    pub fn failing_post_import(mut self, model_name: &str) -> Self {
        self.fail_post_import.insert(model_name.to_string());
        self
    }

    pub fn populate_calls(&self) -> usize {
        self.populate_calls.load(Ordering::SeqCst)
    }

    /// Archive names in the order population ran
    pub fn populated(&self) -> Vec<String> {
        self.populated.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelPlugin for TestPlugin {
    fn model_name(&self) -> &str {
        "thing"
    }

    fn hashable_file_extensions(&self) -> &[&str] {
        &["ini", ".json"]
    }

    fn create_model(
        &self,
        archive: &dyn ArchiveReader,
        _parameters: &ImportParameters,
    ) -> anyhow::Result<Option<Model>> {
        if self.decline.contains(archive.name()) {
            return Ok(None);
        }
        Ok(Some(Model::new(archive.name())))
    }

    async fn populate(
        &self,
        model: &mut Model,
        archive: &dyn ArchiveReader,
        ctx: &mut PopulateContext<'_>,
    ) -> anyhow::Result<()> {
        let name = archive.name().to_string();
        self.populate_calls.fetch_add(1, Ordering::SeqCst);
        self.populated.lock().unwrap().push(name.clone());

        if let Some(delay) = self.slow_populate.get(&name) {
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Err(ImportError::Cancelled.into()),
                _ = tokio::time::sleep(*delay) => {}
            }
        }

        if self.fail_populate.contains(&name) {
            anyhow::bail!("corrupt definition in {}", name);
        }

        if let Some((filename, bytes)) = self.rewrite.get(&name) {
            ctx.write_file(model, filename, bytes.clone()).await?;
        }

        if let Some(new_name) = self.rename.get(&name) {
            model.name = new_name.clone();
        }

        model
            .metadata
            .insert("files".to_string(), model.files.len().to_string());
        Ok(())
    }

    async fn post_import(&self, model: &Model, conn: &mut SqliteConnection) -> anyhow::Result<()> {
        if self.fail_post_import.contains(&model.name) {
            // Write first so the rollback has something to undo
            sqlx::query("UPDATE models SET name = 'tampered' WHERE id = ?")
                .bind(model.id.to_string())
                .execute(&mut *conn)
                .await?;
            anyhow::bail!("post-import hook rejected {}", model.name);
        }
        Ok(())
    }
}

/// Archive whose streams cannot be read
pub struct BrokenArchive {
    name: String,
}

impl BrokenArchive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl ArchiveReader for BrokenArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn filenames(&self) -> Vec<String> {
        vec!["thing.ini".to_string()]
    }

    fn get_stream(&self, filename: &str) -> io::Result<Box<dyn Read + Send>> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("truncated entry {}", filename),
        ))
    }
}

/// Progress sink that keeps every update
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ProgressNotification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<ProgressNotification> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ProgressNotification> {
        self.updates.lock().unwrap().last().cloned()
    }
}

impl ProgressSink for RecordingSink {
    fn update(&self, notification: &ProgressNotification) {
        self.updates.lock().unwrap().push(notification.clone());
    }
}

pub fn memory_archive(name: &str, files: &[(&str, &[u8])]) -> Arc<dyn ArchiveReader> {
    let archive = files
        .iter()
        .fold(MemoryArchiveReader::new(name), |archive, (filename, bytes)| {
            archive.with_file(*filename, bytes.to_vec())
        });
    Arc::new(archive)
}

pub fn memory_task(name: &str, files: &[(&str, &[u8])]) -> ImportTask {
    ImportTask::from_reader(memory_archive(name, files))
}

/// Create `parent/name/` holding `files`
pub fn write_folder(parent: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let root = parent.join(name);
    for (filename, bytes) in files {
        let path = root.join(filename);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
    }
    std::fs::create_dir_all(&root).unwrap();
    root
}

/// Temporary catalog + store with an importer over a [`TestPlugin`]
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub catalog: Catalog,
    pub store: FileStore,
    pub plugin: Arc<TestPlugin>,
    pub importer: Arc<ArchiveImporter>,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with(TestPlugin::new(), test_config()).await
    }

    pub async fn with_plugin(plugin: TestPlugin) -> Self {
        Self::with(plugin, test_config()).await
    }

    pub async fn with(plugin: TestPlugin, config: ImportConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let pool = stash_common::db::init_database(&temp_dir.path().join("stash.db"))
            .await
            .unwrap();
        let catalog = Catalog::new(pool);
        let store = FileStore::open(temp_dir.path().join("files")).unwrap();
        let plugin = Arc::new(plugin);

        let importer = ArchiveImporter::new(plugin.clone(), catalog.clone(), store.clone(), config);

        Self {
            temp_dir,
            catalog,
            store,
            plugin,
            importer: Arc::new(importer),
        }
    }

    /// Scratch directory for source archives
    pub fn sources(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("sources");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Defaults with a short pause poll so pause tests stay quick
pub fn test_config() -> ImportConfig {
    ImportConfig {
        pause_poll_interval: Duration::from_millis(5),
        ..ImportConfig::default()
    }
}
