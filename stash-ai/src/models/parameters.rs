//! Import parameters

use serde::{Deserialize, Serialize};

/// Per-call import configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParameters {
    /// Enable fast-hash duplicate pre-checks and route heavy work to the batch pool.
    /// Forced on when a call carries more tasks than the batch threshold.
    #[serde(default)]
    pub batch: bool,

    /// Bypass the pause gate
    #[serde(default)]
    pub import_immediately: bool,

    /// Hard-link source files into the store where the archive exposes local paths
    #[serde(default)]
    pub prefer_hard_links: bool,
}

impl ImportParameters {
    pub fn batch() -> Self {
        Self {
            batch: true,
            ..Self::default()
        }
    }

    pub fn immediate() -> Self {
        Self {
            import_immediately: true,
            ..Self::default()
        }
    }
}
