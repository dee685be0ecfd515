//! Storage wrappers for exercising failure paths.

use async_trait::async_trait;
use stash_storage::{BlobReader, ObjectStore, StorageError, StorageResult, StreamingUpload};
use std::sync::{Arc, Mutex};

/// Reports the first `collisions` created keys as already taken.
#[allow(dead_code)]
pub struct CollidingStore {
    inner: Arc<dyn ObjectStore>,
    collisions: Mutex<usize>,
    rejected: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl CollidingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, collisions: usize) -> Self {
        Self {
            inner,
            collisions: Mutex::new(collisions),
            rejected: Mutex::new(Vec::new()),
        }
    }

    /// Keys refused so far, in order.
    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for CollidingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn create(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        {
            let mut collisions = self.collisions.lock().unwrap();
            if *collisions > 0 {
                *collisions -= 1;
                self.rejected.lock().unwrap().push(key.to_string());
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
        }
        self.inner.create(key).await
    }

    async fn open(&self, key: &str) -> StorageResult<Box<dyn BlobReader>> {
        self.inner.open(key).await
    }

    fn backend_name(&self) -> &'static str {
        "colliding"
    }
}
