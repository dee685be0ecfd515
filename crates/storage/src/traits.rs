//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek};

/// Write-once blob storage keyed by slug.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if a blob has been published under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Start writing a new blob.
    ///
    /// Fails with `AlreadyExists` when `key` is already published. Nothing
    /// becomes visible under `key` until [`StreamingUpload::finish`] succeeds.
    async fn create(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Open a published blob for reading.
    ///
    /// Fails with `NotFound` when no blob exists under `key`.
    async fn open(&self, key: &str) -> StorageResult<Box<dyn BlobReader>>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup before accepting requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes accepted by the backend so far.
    fn bytes_written(&self) -> u64;

    /// Publish the blob and return the total bytes written.
    ///
    /// Fails with `AlreadyExists` if another upload published the same key
    /// first; the data written here is then discarded.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding everything written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// A seekable reader over a published blob.
#[async_trait]
pub trait BlobReader: AsyncRead + AsyncSeek + Send + Unpin {
    /// Release the underlying handle.
    async fn close(self: Box<Self>) -> StorageResult<()>;
}
