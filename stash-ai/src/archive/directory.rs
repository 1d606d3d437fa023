//! Folder-backed archive

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::ArchiveReader;
use crate::error::{ImportError, ImportResult};

/// Files ignored when enumerating a folder
const IGNORED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Archive over a folder tree. Filenames are relative to the folder and
/// always `/`-separated.
#[derive(Debug, Clone)]
pub struct DirectoryArchiveReader {
    root: PathBuf,
    name: String,
    filenames: Vec<String>,
}

impl DirectoryArchiveReader {
    /// Enumerate the folder once; the listing is fixed for the reader's lifetime
    pub fn open(root: &Path) -> ImportResult<Self> {
        if !root.is_dir() {
            return Err(ImportError::Archive(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let mut filenames = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                ImportError::Archive(format!("Cannot read {}: {}", root.display(), e))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if IGNORED_NAMES.iter().any(|ignored| file_name == *ignored) {
                continue;
            }

            let relative = entry.path().strip_prefix(root).map_err(|e| {
                ImportError::Internal(format!("Walked outside archive root: {}", e))
            })?;

            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            filenames.push(name);
        }
        filenames.sort();

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        Ok(Self {
            root: root.to_path_buf(),
            name,
            filenames,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, filename: &str) -> std::io::Result<PathBuf> {
        if !self.filenames.iter().any(|f| f == filename) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not part of archive {}", filename, self.name),
            ));
        }
        Ok(filename.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }
}

impl ArchiveReader for DirectoryArchiveReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn filenames(&self) -> Vec<String> {
        self.filenames.clone()
    }

    fn get_stream(&self, filename: &str) -> std::io::Result<Box<dyn Read + Send>> {
        let path = self.resolve(filename)?;
        Ok(Box::new(File::open(path)?))
    }

    fn local_path(&self, filename: &str) -> Option<PathBuf> {
        self.resolve(filename).ok()
    }
}
