//! Content-addressed blob storage on the local filesystem
//!
//! Blobs live at `<root>/<h0>/<h0h1>/<sha256>`. Adding is idempotent: content
//! that already exists is not rewritten. Writers stage into `<root>/.tmp` and
//! rename into place, so concurrent adds of the same content never expose a
//! partially written blob (the last rename wins, and every candidate is
//! byte-identical).

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::model::storage_path_for;
use crate::models::StoredFile;

const COPY_BUFFER_SIZE: usize = 1024 * 1024;
const TEMP_DIR_NAME: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TEMP_DIR_NAME))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a store-relative storage path
    pub fn full_path(&self, storage_path: &str) -> PathBuf {
        storage_path
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    pub fn exists(&self, storage_path: &str) -> bool {
        self.full_path(storage_path).is_file()
    }

    pub fn get_stream(&self, storage_path: &str) -> io::Result<File> {
        File::open(self.full_path(storage_path))
    }

    /// Store the content of `reader` if absent. Blocking.
    pub fn add(&self, mut reader: impl Read) -> io::Result<StoredFile> {
        let temp_path = self.root.join(TEMP_DIR_NAME).join(Uuid::new_v4().to_string());

        let staged = (|| -> io::Result<StoredFile> {
            let mut temp = File::create(&temp_path)?;
            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
            let mut size = 0u64;

            loop {
                let bytes_read = match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                hasher.update(&buffer[..bytes_read]);
                temp.write_all(&buffer[..bytes_read])?;
                size += bytes_read as u64;
            }
            temp.sync_all()?;

            Ok(StoredFile::new(format!("{:x}", hasher.finalize()), size))
        })();

        let stored = match staged {
            Ok(stored) => stored,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        let target = self.full_path(&stored.storage_path());
        if target.is_file() {
            fs::remove_file(&temp_path)?;
            tracing::trace!(hash = %stored.hash, "Blob already present");
            return Ok(stored);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::rename(&temp_path, &target) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        tracing::trace!(hash = %stored.hash, size = stored.size, "Blob stored");
        Ok(stored)
    }

    /// Convenience for content already in memory
    pub fn add_bytes(&self, bytes: &[u8]) -> io::Result<StoredFile> {
        self.add(bytes)
    }

    /// Store a file from disk. With `prefer_hard_link` the source is linked
    /// into place instead of copied; when linking is impossible (different
    /// volume, unsupported filesystem) this falls back to a copy. Blocking.
    pub fn add_path(&self, source: &Path, prefer_hard_link: bool) -> io::Result<StoredFile> {
        if !prefer_hard_link {
            return self.add(File::open(source)?);
        }

        let stored = hash_file(source)?;
        let target = self.full_path(&stored.storage_path());
        if target.is_file() {
            return Ok(stored);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::hard_link(source, &target) {
            Ok(()) => {
                tracing::trace!(hash = %stored.hash, source = %source.display(), "Blob hard-linked");
                Ok(stored)
            }
            // Another import linked or copied the same content first
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(stored),
            Err(e) => {
                tracing::debug!(
                    source = %source.display(),
                    error = %e,
                    "Hard link failed, copying instead"
                );
                self.add(File::open(source)?)
            }
        }
    }

    /// Storage path for a content hash (exposed for catalog consistency checks)
    pub fn storage_path(hash: &str) -> String {
        storage_path_for(hash)
    }
}

fn hash_file(path: &Path) -> io::Result<StoredFile> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(StoredFile::new(format!("{:x}", hasher.finalize()), size))
}
