//! Data models for stash-ai (archive ingest)

pub mod import_task;
pub mod model;
pub mod outcome;
pub mod parameters;

pub use import_task::{ImportSource, ImportTask};
pub use model::{FileUsage, Model, StoredFile};
pub use outcome::{ImportStage, ItemOutcome};
pub use parameters::ImportParameters;
