//! Import requests

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{self, ArchiveReader, MemoryArchiveReader};
use crate::error::ImportResult;

/// Where an import task's content comes from
#[derive(Clone)]
pub enum ImportSource {
    /// Folder or loose file on disk
    Path(PathBuf),
    /// Bytes handed over by the caller, imported as a one-file archive
    Stream { name: String, bytes: Arc<[u8]> },
    /// Reader opened by the caller (e.g. a container format handled upstream)
    Reader(Arc<dyn ArchiveReader>),
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ImportSource::Stream { name, bytes } => f
                .debug_struct("Stream")
                .field("name", name)
                .field("len", &bytes.len())
                .finish(),
            ImportSource::Reader(reader) => f.debug_tuple("Reader").field(&reader.name()).finish(),
        }
    }
}

/// One import request; yields at most one model
#[derive(Debug, Clone)]
pub struct ImportTask {
    pub source: ImportSource,
    /// Remove the source from disk once the import succeeds (subject to the
    /// plug-in's deletion policy)
    pub delete_on_import: bool,
    pub prefer_hard_links: bool,
}

impl ImportTask {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(ImportSource::Path(path.into()))
    }

    pub fn from_stream(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(ImportSource::Stream {
            name: name.into(),
            bytes: bytes.into(),
        })
    }

    pub fn from_reader(reader: Arc<dyn ArchiveReader>) -> Self {
        Self::new(ImportSource::Reader(reader))
    }

    fn new(source: ImportSource) -> Self {
        Self {
            source,
            delete_on_import: false,
            prefer_hard_links: false,
        }
    }

    pub fn delete_on_import(mut self, delete: bool) -> Self {
        self.delete_on_import = delete;
        self
    }

    pub fn prefer_hard_links(mut self, prefer: bool) -> Self {
        self.prefer_hard_links = prefer;
        self
    }

    /// Source path on disk, if any
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ImportSource::Path(path) => Some(path),
            _ => None,
        }
    }

    /// Human readable identifier for logs and notifications
    pub fn display_name(&self) -> String {
        match &self.source {
            ImportSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImportSource::Stream { name, .. } => name.clone(),
            ImportSource::Reader(reader) => reader.name().to_string(),
        }
    }

    /// Open the archive reader for this task. Folder enumeration is blocking IO.
    pub fn open(&self) -> ImportResult<Arc<dyn ArchiveReader>> {
        match &self.source {
            ImportSource::Path(path) => archive::open_path(path),
            ImportSource::Stream { name, bytes } => Ok(Arc::new(MemoryArchiveReader::single(
                name.clone(),
                bytes.clone(),
            ))),
            ImportSource::Reader(reader) => Ok(reader.clone()),
        }
    }
}
