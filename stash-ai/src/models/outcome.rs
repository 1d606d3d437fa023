//! Per-item import results

use std::fmt;

use super::Model;
use crate::error::ImportError;

/// Stage an item had reached; carried into failure logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Created,
    Reading,
    Staging,
    Hashing,
    Populating,
    Committing,
    Done,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Created => "created",
            ImportStage::Reading => "reading",
            ImportStage::Staging => "staging",
            ImportStage::Hashing => "hashing",
            ImportStage::Populating => "populating",
            ImportStage::Committing => "committing",
            ImportStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of importing one task
#[derive(Debug)]
pub enum ItemOutcome {
    /// A new record was committed
    Imported(Model),
    /// An existing record was reused (and undeleted if needed)
    Reused(Model),
    /// The plug-in produced no model; not a failure
    Skipped,
    Failed(ImportError),
    /// Stopped by the caller's cancellation token
    Cancelled,
}

impl ItemOutcome {
    pub fn model(&self) -> Option<&Model> {
        match self {
            ItemOutcome::Imported(model) | ItemOutcome::Reused(model) => Some(model),
            _ => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            ItemOutcome::Imported(model) | ItemOutcome::Reused(model) => Some(model),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.model().is_some()
    }
}
