//! A loose file treated as an archive of one entry

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::ArchiveReader;
use crate::error::{ImportError, ImportResult};

#[derive(Debug, Clone)]
pub struct SingleFileArchiveReader {
    path: PathBuf,
    filename: String,
}

impl SingleFileArchiveReader {
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.is_file() {
            return Err(ImportError::Archive(format!("Not a file: {}", path.display())));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ImportError::Archive(format!("No file name: {}", path.display())))?;

        Ok(Self {
            path: path.to_path_buf(),
            filename,
        })
    }
}

impl ArchiveReader for SingleFileArchiveReader {
    fn name(&self) -> &str {
        &self.filename
    }

    fn filenames(&self) -> Vec<String> {
        vec![self.filename.clone()]
    }

    fn get_stream(&self, filename: &str) -> std::io::Result<Box<dyn Read + Send>> {
        if filename != self.filename {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not part of archive {}", filename, self.filename),
            ));
        }
        Ok(Box::new(File::open(&self.path)?))
    }

    fn local_path(&self, filename: &str) -> Option<PathBuf> {
        (filename == self.filename).then(|| self.path.clone())
    }
}
