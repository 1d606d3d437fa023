//! Archive readers
//!
//! An archive is a named set of files plus the ability to open a byte stream
//! for each. The import pipeline only consumes [`ArchiveReader`]; this module
//! also provides the readers the service ships with (folder, loose file,
//! in-memory). Container formats are opened elsewhere and handed in as
//! readers.

pub mod directory;
pub mod memory;
pub mod single_file;

pub use directory::DirectoryArchiveReader;
pub use memory::MemoryArchiveReader;
pub use single_file::SingleFileArchiveReader;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ImportError, ImportResult};

/// Uniform view over a set of named files
pub trait ArchiveReader: Send + Sync {
    /// Display name (used for logs and as the last-resort hash identity)
    fn name(&self) -> &str;

    /// Every file in the archive, `/`-separated
    fn filenames(&self) -> Vec<String>;

    /// Open a read stream for one file
    fn get_stream(&self, filename: &str) -> std::io::Result<Box<dyn Read + Send>>;

    /// On-disk location of a file, when the archive is backed by the local
    /// filesystem (enables hard-link staging)
    fn local_path(&self, _filename: &str) -> Option<PathBuf> {
        None
    }
}

/// Open the reader matching a filesystem path: folders become
/// [`DirectoryArchiveReader`], anything else a [`SingleFileArchiveReader`].
pub fn open_path(path: &Path) -> ImportResult<Arc<dyn ArchiveReader>> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        ImportError::Archive(format!("Cannot open {}: {}", path.display(), e))
    })?;

    if metadata.is_dir() {
        Ok(Arc::new(DirectoryArchiveReader::open(path)?))
    } else {
        Ok(Arc::new(SingleFileArchiveReader::open(path)?))
    }
}
