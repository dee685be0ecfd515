//! Hash-while-writing upload wrapper.

use crate::error::{StorageError, StorageResult};
use crate::traits::StreamingUpload;
use bytes::Bytes;
use stash_core::{ContentHash, ContentHasher};

/// Feeds every chunk to both a blob upload and a content hasher.
///
/// The request body is read once; the digest and the stored bytes are
/// computed from the same chunks.
pub struct TeeUpload {
    upload: Box<dyn StreamingUpload>,
    hasher: ContentHasher,
}

impl TeeUpload {
    pub fn new(upload: Box<dyn StreamingUpload>) -> Self {
        Self {
            upload,
            hasher: ContentHasher::new(),
        }
    }

    /// Write a chunk to storage, then hash it.
    pub async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.upload.write(data.clone()).await?;
        self.hasher.update(&data);
        Ok(())
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.hasher.len()
    }

    /// Publish the blob and return its size and digest.
    ///
    /// Sizes are compared before publishing, so a mismatch leaves nothing
    /// behind under the key.
    pub async fn finish(self) -> StorageResult<(u64, ContentHash)> {
        let hashed = self.hasher.len();
        let stored = self.upload.bytes_written();
        if stored != hashed {
            if let Err(e) = self.upload.abort().await {
                tracing::warn!(error = %e, "Failed to discard mismatched upload");
            }
            return Err(StorageError::SizeMismatch { stored, hashed });
        }
        let published = self.upload.finish().await?;
        if published != hashed {
            return Err(StorageError::SizeMismatch {
                stored: published,
                hashed,
            });
        }
        Ok((published, self.hasher.finalize()))
    }

    /// Discard everything written so far.
    pub async fn abort(self) -> StorageResult<()> {
        self.upload.abort().await
    }
}
