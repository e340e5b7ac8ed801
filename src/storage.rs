//! Shared storage for uploaded files.
//!
//! Files are written once under the storage root as `{uuid}{.ext}` and never
//! touched again by the gateway; workers locate them by the path carried in
//! the task message, so the root should be an absolute path both sides share.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StorageError;

/// Longest client extension carried over to the storage name.
const MAX_EXTENSION_LEN: usize = 16;

/// Write-once blob sink rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))
    }

    /// Open a new uniquely named file for an upload called `original_name`.
    pub async fn create(&self, original_name: &str) -> Result<BlobWriter, StorageError> {
        let path = self
            .root
            .join(storage_file_name(Uuid::new_v4(), original_name));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), "Created upload file");
        Ok(BlobWriter {
            path,
            file: BufWriter::new(file),
            bytes: 0,
        })
    }

    /// Delete a stored upload that will not be handed to a worker.
    pub async fn remove(&self, file: &StoredFile) {
        if let Err(e) = fs::remove_file(&file.path).await {
            warn!(path = %file.path.display(), "Failed to remove upload: {}", e);
        }
    }
}

/// An upload file being written.
pub struct BlobWriter {
    path: PathBuf,
    file: BufWriter<File>,
    bytes: u64,
}

impl BlobWriter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush and sync the file to disk.
    ///
    /// On failure the partial file is removed before the error is returned.
    pub async fn finish(mut self) -> Result<StoredFile, StorageError> {
        if let Err(e) = self.sync().await {
            self.discard().await;
            return Err(e);
        }

        Ok(StoredFile {
            path: self.path,
            bytes: self.bytes,
        })
    }

    async fn sync(&mut self) -> Result<(), StorageError> {
        self.file
            .flush()
            .await
            .map_err(|e| io_error(&self.path, e))?;
        self.file
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| io_error(&self.path, e))
    }

    /// Remove a partially written file.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), "Failed to remove partial upload: {}", e);
        }
    }
}

/// A completely written upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub bytes: u64,
}

impl StoredFile {
    /// Path as carried in the task message.
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Storage name for an upload: the id followed by the client's extension.
pub fn storage_file_name(id: Uuid, original_name: &str) -> String {
    format!("{}{}", id, extension_of(original_name))
}

/// The `.ext` suffix of a client filename, or empty when it has none or it
/// is not a plain alphanumeric extension.
fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
