//! Import services
//!
//! Hashing, duplicate resolution, scheduling and the pipeline that ties
//! them together.

pub mod duplicate_resolver;
pub mod hasher;
pub mod importer;
pub mod pause_gate;
pub mod progress;
pub mod worker_pool;

pub use duplicate_resolver::{DuplicateResolver, Resolution};
pub use importer::ArchiveImporter;
pub use pause_gate::PauseGate;
pub use progress::{
    summarize, EventBusSink, ImportProgress, NullSink, ProgressNotification, ProgressSink,
};
pub use worker_pool::WorkerPool;
