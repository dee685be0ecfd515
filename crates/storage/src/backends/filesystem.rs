//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobReader, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Local filesystem blob store.
///
/// Blobs live directly under the root, one file per key. Uploads go to a
/// hidden temporary file and are published with a hard link, which fails
/// if the key already exists.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Wraps `key_path_sync` in `spawn_blocking` since `canonicalize` and
    /// `symlink_metadata` block.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Keys are single file names. Leading dots are reserved for
    /// in-flight uploads, and a symlink may not lead outside the root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidKey(format!("not a blob key: {key:?}")));
        }

        let path = root.join(key);

        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let root_canonical = root.canonicalize()?;
                let target = path.canonicalize().map_err(|_| {
                    StorageError::InvalidKey(format!("symlink target missing or invalid: {key}"))
                })?;
                if !target.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                Ok(path)
            }
            Ok(_) => Ok(path),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(path),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.tmp.{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn create(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let temp_path = self.temp_path(key);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        Ok(Box::new(FilesystemUpload {
            key: key.to_string(),
            file: Some(file),
            temp_path,
            final_path: path,
            bytes_written: 0,
            cleaned_up: false,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, key: &str) -> StorageResult<Box<dyn BlobReader>> {
        let path = self.key_path(key).await?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl BlobReader for fs::File {
    async fn close(self: Box<Self>) -> StorageResult<()> {
        drop(self);
        Ok(())
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    key: String,
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
    cleaned_up: bool,
}

impl FilesystemUpload {
    async fn remove_temp(&mut self) {
        self.file = None;
        if let Err(e) = fs::remove_file(&self.temp_path).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = ?self.temp_path, error = %e, "failed to remove temporary upload");
        }
        self.cleaned_up = true;
    }
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("upload already closed")))?;
        file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        if let Some(file) = self.file.take() {
            // Flush to disk before the blob becomes visible.
            file.sync_all().await?;
        }

        // A hard link publishes atomically and refuses to replace an existing blob.
        let published = fs::hard_link(&self.temp_path, &self.final_path).await;
        self.remove_temp().await;

        match published {
            Ok(()) => Ok(self.bytes_written),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(self.key.clone()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.remove_temp().await;
        Ok(())
    }
}

impl Drop for FilesystemUpload {
    fn drop(&mut self) {
        // Cancelled uploads never reach finish or abort.
        if !self.cleaned_up {
            self.file = None;
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
