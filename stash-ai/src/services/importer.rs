//! Archive import pipeline
//!
//! Per item: open the archive, build a bare model through the plug-in, wait
//! on the pause gate, try the batch fast path, then hand the heavy unit
//! (stage, hash, populate, resolve duplicates, commit) to one of two worker
//! pools. Items of one call fan out with bounded parallelism; a failure stays
//! with its item, while the caller's cancellation aborts the whole call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use stash_common::events::{EventBus, StashEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::duplicate_resolver::{DuplicateResolver, Resolution};
use super::hasher;
use super::pause_gate::PauseGate;
use super::progress::{EventBusSink, ImportProgress, NullSink, ProgressSink};
use super::worker_pool::WorkerPool;
use crate::archive::ArchiveReader;
use crate::config::ImportConfig;
use crate::db::{models, Catalog};
use crate::error::{ImportError, ImportResult};
use crate::models::{ImportParameters, ImportStage, ImportTask, ItemOutcome, Model, StoredFile};
use crate::plugins::{ModelPlugin, PopulateContext};
use crate::store::FileStore;

/// Import pipeline for one content type
pub struct ArchiveImporter {
    shared: Shared,
    resolver: DuplicateResolver,
    pause: PauseGate,
    default_pool: WorkerPool,
    batch_pool: WorkerPool,
    event_bus: Option<EventBus>,
}

/// Handles moved into heavy work units
#[derive(Clone)]
struct Shared {
    plugin: Arc<dyn ModelPlugin>,
    catalog: Catalog,
    store: FileStore,
    resolver: DuplicateResolver,
    config: ImportConfig,
}

/// Last stage an item reached and the id of its bare model, readable after
/// the unit leaves the pool
#[derive(Clone)]
struct StageCell(Arc<Mutex<(ImportStage, Option<Uuid>)>>);

impl StageCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new((ImportStage::Created, None))))
    }

    fn with<R>(&self, f: impl FnOnce(&mut (ImportStage, Option<Uuid>)) -> R) -> R {
        match self.0.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set(&self, stage: ImportStage) {
        self.with(|cell| cell.0 = stage);
    }

    fn set_model(&self, id: Uuid) {
        self.with(|cell| cell.1 = Some(id));
    }

    fn get(&self) -> ImportStage {
        self.with(|cell| cell.0)
    }

    /// Rendered for logging; absent until a model exists
    fn model_id(&self) -> Option<String> {
        self.with(|cell| cell.1.map(|id| id.to_string()))
    }
}

/// Successful item: the model and whether it was an existing record
type Committed = (Model, bool);

impl ArchiveImporter {
    /// Must be called from within a Tokio runtime (spawns the pool workers)
    pub fn new(
        plugin: Arc<dyn ModelPlugin>,
        catalog: Catalog,
        store: FileStore,
        config: ImportConfig,
    ) -> Self {
        let resolver = DuplicateResolver::new(catalog.clone(), store.clone(), plugin.clone());
        let default_pool = WorkerPool::new("default", config.default_pool_workers);
        let batch_pool = WorkerPool::new("batch", config.batch_pool_workers);

        Self {
            shared: Shared {
                plugin,
                catalog,
                store,
                resolver: resolver.clone(),
                config,
            },
            resolver,
            pause: PauseGate::new(),
            default_pool,
            batch_pool,
            event_bus: None,
        }
    }

    /// Publish progress and model events on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Share a pause gate with other components
    pub fn with_pause_gate(mut self, gate: PauseGate) -> Self {
        self.pause = gate;
        self
    }

    pub fn pause_gate(&self) -> &PauseGate {
        &self.pause
    }

    pub fn config(&self) -> &ImportConfig {
        &self.shared.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.shared.catalog
    }

    pub fn store(&self) -> &FileStore {
        &self.shared.store
    }

    fn model_name(&self) -> &str {
        self.shared.plugin.model_name()
    }

    fn new_sink(&self) -> Arc<dyn ProgressSink> {
        match &self.event_bus {
            Some(bus) => Arc::new(EventBusSink::new(bus.clone())),
            None => Arc::new(NullSink),
        }
    }

    /// Import folders or loose files with default parameters
    pub async fn import_paths(&self, paths: &[PathBuf]) -> ImportResult<Vec<Model>> {
        let tasks = paths.iter().map(ImportTask::from_path).collect();
        self.import_tasks(tasks, ImportParameters::default()).await
    }

    /// Import tasks, reporting on the event bus (if any)
    pub async fn import_tasks(
        &self,
        tasks: Vec<ImportTask>,
        parameters: ImportParameters,
    ) -> ImportResult<Vec<Model>> {
        let sink = self.new_sink();
        self.import_tasks_with_progress(tasks, parameters, sink, &CancellationToken::new())
            .await
    }

    /// Import tasks with an explicit sink and call-scoped cancellation
    ///
    /// Item failures are logged and left out of the result. Cancelling
    /// `cancel` aborts the call with [`ImportError::Cancelled`]; records
    /// already committed stay in the catalog.
    pub async fn import_tasks_with_progress(
        &self,
        tasks: Vec<ImportTask>,
        mut parameters: ImportParameters,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> ImportResult<Vec<Model>> {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        if total > self.shared.config.batch_threshold && !parameters.batch {
            debug!(
                model_type = self.model_name(),
                total,
                threshold = self.shared.config.batch_threshold,
                "Large import, switching to batch mode"
            );
            parameters.batch = true;
        }

        let start_time = Instant::now();
        info!(
            model_type = self.model_name(),
            total,
            batch = parameters.batch,
            "Import started"
        );

        let progress = ImportProgress::new(sink, self.model_name(), total);
        progress.started();

        let this = self;
        let progress_ref = &progress;
        let mut outcomes = stream::iter(tasks)
            .map(move |task| async move {
                let item_name = task.display_name();
                let outcome = this.import_item(task, parameters, cancel, Some(progress_ref)).await;
                progress_ref.item_finished(outcome.is_success(), &item_name);
                outcome
            })
            .buffer_unordered(self.shared.config.fan_out_limit.max(1));

        let mut imported = Vec::new();
        let mut failed = 0usize;
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ItemOutcome::Imported(model) | ItemOutcome::Reused(model) => imported.push(model),
                ItemOutcome::Skipped => {}
                ItemOutcome::Failed(_) => failed += 1,
                ItemOutcome::Cancelled if cancel.is_cancelled() => break,
                ItemOutcome::Cancelled => {
                    // Cancelled by something scoped to the item, not the caller
                    warn!(model_type = self.model_name(), "Item cancelled internally, continuing");
                }
            }
        }
        drop(outcomes);

        let elapsed_ms = start_time.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            let summary = progress.finish(true);
            info!(
                model_type = self.model_name(),
                imported = imported.len(),
                total,
                elapsed_ms,
                "{}",
                summary.text
            );
            return Err(ImportError::Cancelled);
        }

        let summary = progress.finish(false);
        info!(
            model_type = self.model_name(),
            imported = imported.len(),
            failed,
            total,
            elapsed_ms,
            "{}",
            summary.text
        );

        Ok(imported)
    }

    /// Import a single task. `Ok(None)` when the plug-in declined it.
    ///
    /// Item failures are returned as errors here, since there are no
    /// siblings to protect.
    pub async fn import_one(
        &self,
        task: ImportTask,
        parameters: ImportParameters,
        cancel: &CancellationToken,
    ) -> ImportResult<Option<Model>> {
        let progress = ImportProgress::new(self.new_sink(), self.model_name(), 1);
        progress.started();

        let item_name = task.display_name();
        let outcome = self.import_item(task, parameters, cancel, Some(&progress)).await;
        progress.item_finished(outcome.is_success(), &item_name);
        progress.finish(matches!(outcome, ItemOutcome::Cancelled));

        match outcome {
            ItemOutcome::Imported(model) | ItemOutcome::Reused(model) => Ok(Some(model)),
            ItemOutcome::Skipped => Ok(None),
            ItemOutcome::Failed(e) => Err(e),
            ItemOutcome::Cancelled => Err(ImportError::Cancelled),
        }
    }

    /// Run one item to a tagged outcome. Never propagates item errors.
    pub async fn import_item(
        &self,
        task: ImportTask,
        parameters: ImportParameters,
        cancel: &CancellationToken,
        progress: Option<&ImportProgress>,
    ) -> ItemOutcome {
        let item_name = task.display_name();
        let stage = StageCell::new();

        match self.run_item(&task, parameters, cancel, progress, &stage).await {
            Ok(Some((model, reused))) => {
                self.after_success(&task, &model, reused).await;
                if reused {
                    ItemOutcome::Reused(model)
                } else {
                    ItemOutcome::Imported(model)
                }
            }
            Ok(None) => ItemOutcome::Skipped,
            Err(e) if e.is_cancelled() => {
                info!(
                    model_type = self.model_name(),
                    archive = %item_name,
                    model_id = stage.model_id(),
                    stage = %stage.get(),
                    "Import cancelled"
                );
                ItemOutcome::Cancelled
            }
            Err(e) => {
                error!(
                    model_type = self.model_name(),
                    archive = %item_name,
                    model_id = stage.model_id(),
                    stage = %stage.get(),
                    error = %e,
                    "Import failed"
                );
                ItemOutcome::Failed(e)
            }
        }
    }

    async fn run_item(
        &self,
        task: &ImportTask,
        parameters: ImportParameters,
        cancel: &CancellationToken,
        progress: Option<&ImportProgress>,
        stage: &StageCell,
    ) -> ImportResult<Option<Committed>> {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let opener = task.clone();
        let archive = tokio::task::spawn_blocking(move || opener.open()).await??;

        let model = match self.shared.plugin.create_model(archive.as_ref(), &parameters) {
            Ok(Some(model)) => model,
            Ok(None) => {
                debug!(
                    model_type = self.model_name(),
                    archive = archive.name(),
                    "No model created, skipping"
                );
                return Ok(None);
            }
            Err(e) => {
                warn!(
                    model_type = self.model_name(),
                    archive = archive.name(),
                    error = %e,
                    "Model creation failed, skipping"
                );
                return Ok(None);
            }
        };

        stage.set_model(model.id);

        if !parameters.import_immediately {
            let waited = self
                .pause
                .wait_until_resumed(self.shared.config.pause_poll_interval, cancel, || {
                    if let Some(progress) = progress {
                        progress.paused();
                    }
                })
                .await?;
            if waited {
                debug!(model_type = self.model_name(), archive = archive.name(), "Import resumed");
            }
        }

        stage.set(ImportStage::Reading);

        if parameters.batch {
            if let Some(existing) = self.try_fast_path(&archive, &model).await? {
                return Ok(Some((existing, true)));
            }
        }

        let pool = if parameters.batch {
            &self.batch_pool
        } else {
            &self.default_pool
        };

        let unit = self.shared.clone().stage_and_commit(
            model,
            archive,
            parameters.prefer_hard_links || task.prefer_hard_links,
            cancel.clone(),
            stage.clone(),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ImportError::Cancelled),
            result = pool.run(unit) => result?.map(Some),
        }
    }

    async fn try_fast_path(
        &self,
        archive: &Arc<dyn ArchiveReader>,
        candidate: &Model,
    ) -> ImportResult<Option<Model>> {
        let reader = archive.clone();
        let plugin = self.shared.plugin.clone();
        let fast_hash = tokio::task::spawn_blocking(move || {
            hasher::compute_archive_hash(reader.as_ref(), plugin.hashable_file_extensions())
        })
        .await??;

        let Some(mut existing) = self
            .resolver
            .fast_path(&fast_hash, &archive.filenames(), candidate)
            .await?
        else {
            return Ok(None);
        };

        self.shared.catalog.undelete_for_reuse(&mut existing).await?;
        info!(
            model_type = self.model_name(),
            archive = archive.name(),
            model_id = %existing.id,
            hash = %existing.hash,
            "Found existing record (fast path), skipping import"
        );

        Ok(Some(existing))
    }

    async fn after_success(&self, task: &ImportTask, model: &Model, reused: bool) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(StashEvent::ModelImported {
                model_id: model.id,
                name: model.name.clone(),
                hash: model.hash.clone(),
                reused,
                timestamp: Utc::now(),
            });
        }

        if !task.delete_on_import {
            return;
        }
        let Some(path) = task.path() else {
            return;
        };
        if !self.shared.plugin.should_delete_archive(path) {
            return;
        }

        let target = path.to_path_buf();
        match tokio::task::spawn_blocking(move || remove_source(&target)).await {
            Ok(Ok(())) => debug!(path = %path.display(), "Deleted imported source"),
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Could not delete imported source"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not delete imported source"),
        }
    }
}

impl Shared {
    /// Heavy unit of one item, run on a worker pool
    async fn stage_and_commit(
        self,
        mut model: Model,
        archive: Arc<dyn ArchiveReader>,
        prefer_hard_links: bool,
        cancel: CancellationToken,
        stage: StageCell,
    ) -> ImportResult<Committed> {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        stage.set(ImportStage::Staging);
        let staged = {
            let store = self.store.clone();
            let archive = archive.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || stage_files(&store, archive.as_ref(), prefer_hard_links, &cancel))
                .await??
        };
        for (filename, stored) in staged {
            model.set_file(filename, stored);
        }

        stage.set(ImportStage::Hashing);
        let mut tx = self.catalog.begin_write("importer::stage_and_commit").await?;
        {
            let files: Vec<&StoredFile> = model.files.iter().map(|u| &u.file).collect();
            models::register_stored_files(tx.conn()?, &files).await?;
        }
        model.hash = self.hash_model(&model, archive.name()).await?;

        stage.set(ImportStage::Populating);
        {
            let started = Instant::now();
            let mut ctx = PopulateContext::new(tx.conn()?, &self.store, &cancel);
            let populated = tokio::time::timeout(
                self.config.populate_timeout,
                self.plugin.populate(&mut model, archive.as_ref(), &mut ctx),
            )
            .await;

            match populated {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(plugin_error(e)),
                Err(_) => {
                    return Err(ImportError::Timeout {
                        step: "populate",
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    })
                }
            }
        }

        if cancel.is_cancelled() {
            tx.rollback().await?;
            return Err(ImportError::Cancelled);
        }

        // Population may have rewritten hashable files
        model.hash = self.hash_model(&model, archive.name()).await?;

        stage.set(ImportStage::Committing);
        match self.resolver.resolve(tx.conn()?, &model).await? {
            Resolution::Reuse(mut existing) => {
                if existing.delete_pending {
                    models::set_delete_pending(tx.conn()?, existing.id, false).await?;
                    existing.delete_pending = false;
                }
                tx.commit().await?;

                info!(
                    model_type = self.plugin.model_name(),
                    archive = archive.name(),
                    model_id = %existing.id,
                    hash = %existing.hash,
                    "Found existing record, reusing"
                );
                stage.set(ImportStage::Done);
                return Ok((existing, true));
            }
            Resolution::Supersede(existing) => {
                info!(
                    model_type = self.plugin.model_name(),
                    archive = archive.name(),
                    model_id = %existing.id,
                    hash = %existing.hash,
                    "Existing record has different files, replacing"
                );
                models::set_delete_pending(tx.conn()?, existing.id, true).await?;
            }
            Resolution::New => {}
        }

        models::insert_model(tx.conn()?, &model).await?;
        self.plugin
            .post_import(&model, tx.conn()?)
            .await
            .map_err(plugin_error)?;
        tx.commit().await?;

        stage.set(ImportStage::Done);
        info!(
            model_type = self.plugin.model_name(),
            archive = archive.name(),
            model_id = %model.id,
            hash = %model.hash,
            files = model.files.len(),
            "Imported"
        );

        Ok((model, false))
    }

    /// `source_name` must be the archive's display name so the result
    /// matches the fast hash when nothing is hashable
    async fn hash_model(&self, model: &Model, source_name: &str) -> ImportResult<String> {
        let store = self.store.clone();
        let plugin = self.plugin.clone();
        let snapshot = model.clone();
        let source_name = source_name.to_string();
        let hash = tokio::task::spawn_blocking(move || {
            hasher::compute_model_hash(
                &snapshot,
                &store,
                plugin.hashable_file_extensions(),
                &source_name,
            )
        })
        .await??;
        Ok(hash)
    }
}

/// Copy (or hard-link) every archive entry into the store. Blocking.
fn stage_files(
    store: &FileStore,
    archive: &dyn ArchiveReader,
    prefer_hard_links: bool,
    cancel: &CancellationToken,
) -> ImportResult<Vec<(String, StoredFile)>> {
    let filenames = archive.filenames();
    let mut staged = Vec::with_capacity(filenames.len());

    for filename in filenames {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let stored = match archive.local_path(&filename) {
            Some(path) if prefer_hard_links => store.add_path(&path, true)?,
            _ => store.add(archive.get_stream(&filename)?)?,
        };
        staged.push((filename, stored));
    }

    Ok(staged)
}

fn remove_source(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Plug-in errors that wrap a cancellation stay cancellations
fn plugin_error(err: anyhow::Error) -> ImportError {
    match err.downcast::<ImportError>() {
        Ok(inner) => inner,
        Err(err) => ImportError::Plugin(err),
    }
}
