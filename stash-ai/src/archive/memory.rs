//! In-memory archive, used for stream-sourced imports

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use super::ArchiveReader;

#[derive(Debug, Clone)]
pub struct MemoryArchiveReader {
    name: String,
    files: BTreeMap<String, Arc<[u8]>>,
}

impl MemoryArchiveReader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
        }
    }

    /// A one-entry archive whose single file carries the archive's name
    pub fn single(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self::new(name.clone()).with_file(name, bytes)
    }

    pub fn with_file(mut self, filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.files.insert(filename.into(), bytes.into());
        self
    }
}

impl ArchiveReader for MemoryArchiveReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn filenames(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn get_stream(&self, filename: &str) -> std::io::Result<Box<dyn Read + Send>> {
        let bytes = self.files.get(filename).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not part of archive {}", filename, self.name),
            )
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
