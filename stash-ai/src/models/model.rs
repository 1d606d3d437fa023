//! Catalog records: models, their named file usages and the stored blobs behind them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Content-addressed blob. The hash is its identity; the bytes live in the
/// file store exactly once however many usages reference them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredFile {
    /// Lowercase hex SHA-256 of the content
    pub hash: String,
    /// Content length in bytes
    pub size: u64,
}

impl StoredFile {
    pub fn new(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            size,
        }
    }

    /// Path of the blob relative to the file store root: `a/ab/abcdef...`
    pub fn storage_path(&self) -> String {
        storage_path_for(&self.hash)
    }
}

/// Relative store path for a content hash
pub fn storage_path_for(hash: &str) -> String {
    let first = hash.get(0..1).unwrap_or("_");
    let second = hash.get(0..2).unwrap_or("__");
    format!("{}/{}/{}", first, second, hash)
}

/// Named binding between a model and a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUsage {
    /// Logical filename inside the model (`/`-separated)
    pub filename: String,
    pub file: StoredFile,
}

/// Domain record materialized from an archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Content hash; empty until computed
    pub hash: String,
    /// File usages, filename-unique
    pub files: Vec<FileUsage>,
    /// Soft-delete flag
    pub delete_pending: bool,
    /// Domain-specific fields filled in by the plug-in during population
    pub metadata: BTreeMap<String, String>,
    pub date_added: DateTime<Utc>,
}

impl Model {
    /// Create a bare model with a fresh identity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            hash: String::new(),
            files: Vec::new(),
            delete_pending: false,
            metadata: BTreeMap::new(),
            date_added: Utc::now(),
        }
    }

    /// Bind `filename` to `file`, replacing any existing usage with the same name
    pub fn set_file(&mut self, filename: impl Into<String>, file: StoredFile) {
        let filename = filename.into();
        match self.files.iter_mut().find(|u| u.filename == filename) {
            Some(existing) => existing.file = file,
            None => self.files.push(FileUsage { filename, file }),
        }
    }

    /// Remove the usage named `filename`, returning it if present
    pub fn remove_file(&mut self, filename: &str) -> Option<FileUsage> {
        let index = self.files.iter().position(|u| u.filename == filename)?;
        Some(self.files.remove(index))
    }

    /// Find a usage by filename (case-insensitive, as archive tools disagree on case)
    pub fn file(&self, filename: &str) -> Option<&FileUsage> {
        self.files
            .iter()
            .find(|u| u.filename.eq_ignore_ascii_case(filename))
    }

    /// Filenames in ordinal order
    pub fn sorted_filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.iter().map(|u| u.filename.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `(content hash, filename)` pairs in sorted order; the identity used
    /// when deciding whether an existing record can be reused
    pub fn file_signature(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .files
            .iter()
            .map(|u| (u.file.hash.as_str(), u.filename.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }
}
