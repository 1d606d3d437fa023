//! Error types for stash-ai

use thiserror::Error;

/// Import pipeline error type
#[derive(Debug, Error)]
pub enum ImportError {
    /// The caller's cancellation token fired
    #[error("Import cancelled")]
    Cancelled,

    /// An item-scoped step exceeded its own time limit
    #[error("{step} timed out after {elapsed_ms} ms")]
    Timeout { step: &'static str, elapsed_ms: u64 },

    /// Archive could not be opened or enumerated
    #[error("Archive error: {0}")]
    Archive(String),

    /// IO error (stream reads, file store writes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog query or transaction error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// stash-common error
    #[error("Common error: {0}")]
    Common(#[from] stash_common::Error),

    /// Domain plug-in hook failed
    #[error("Plug-in error: {0}")]
    Plugin(#[source] anyhow::Error),

    /// A worker pool stopped accepting work
    #[error("Worker pool '{0}' is shut down")]
    PoolClosed(&'static str),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    /// True when the error means "stop", not "something broke"
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ImportError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for ImportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImportError::Internal(format!("Blocking task failed: {}", err))
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
