//! Blob storage abstraction and backends for stash.
//!
//! This crate provides:
//! - Write-once blob storage keyed by slug, with atomic publish
//! - Seekable readers over published blobs
//! - A tee that hashes upload bytes while they are written
//! - Backends: local filesystem

pub mod backends;
pub mod error;
pub mod tee;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use tee::TeeUpload;
pub use traits::{BlobReader, ObjectStore, StreamingUpload};

use stash_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
