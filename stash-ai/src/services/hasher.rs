//! Deterministic model fingerprinting
//!
//! A fingerprint is the SHA-256 of the concatenated bytes of every file whose
//! extension is in the plug-in's allowlist, taken in ordinal filename order.
//! The fast hash (raw archive entries) and the authoritative hash (staged file
//! usages) both go through [`compute_hash`] so they agree bit-for-bit on the
//! same logical content.
//!
//! When no file qualifies, the fingerprint is the SHA-256 of the source
//! archive's display name. Both hashes use that name, never the model name,
//! which plug-ins are free to change.

use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::archive::ArchiveReader;
use crate::models::Model;
use crate::store::FileStore;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Case-insensitive extension match. Allowlist entries may be given with or
/// without the leading dot.
pub fn has_hashable_extension<S: AsRef<str>>(filename: &str, extensions: &[S]) -> bool {
    let Some(extension) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return false;
    };

    extensions
        .iter()
        .map(|e| e.as_ref().trim_start_matches('.'))
        .any(|allowed| allowed.eq_ignore_ascii_case(extension))
}

/// Hash the allowlisted subset of `filenames`, opening each through `open`
pub fn compute_hash<S, F, R>(
    filenames: &[String],
    extensions: &[S],
    fallback_name: &str,
    mut open: F,
) -> io::Result<String>
where
    S: AsRef<str>,
    F: FnMut(&str) -> io::Result<R>,
    R: Read,
{
    let mut hashable: Vec<&String> = filenames
        .iter()
        .filter(|name| has_hashable_extension(name, extensions))
        .collect();
    hashable.sort_unstable();

    if hashable.is_empty() {
        return Ok(format!("{:x}", Sha256::digest(fallback_name.as_bytes())));
    }

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    for filename in hashable {
        let mut reader = open(filename.as_str())?;
        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fast hash straight from archive entries. Blocking.
pub fn compute_archive_hash<S: AsRef<str>>(
    archive: &dyn ArchiveReader,
    extensions: &[S],
) -> io::Result<String> {
    let filenames = archive.filenames();
    compute_hash(&filenames, extensions, archive.name(), |name| {
        archive.get_stream(name)
    })
}

/// Authoritative hash from a model's staged file usages. Blocking.
///
/// `source_name` is the display name of the archive the model came from.
pub fn compute_model_hash<S: AsRef<str>>(
    model: &Model,
    store: &FileStore,
    extensions: &[S],
    source_name: &str,
) -> io::Result<String> {
    let filenames: Vec<String> = model.files.iter().map(|u| u.filename.clone()).collect();
    compute_hash(&filenames, extensions, source_name, |name| {
        let usage = model
            .files
            .iter()
            .find(|u| u.filename == name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        store.get_stream(&usage.file.storage_path())
    })
}
