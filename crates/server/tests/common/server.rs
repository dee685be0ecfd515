//! Server test utilities.

use axum::body::{Body, to_bytes};
use axum::http::header::LOCATION;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use stash_core::config::{AppConfig, MetadataConfig, ServerConfig, StorageConfig};
use stash_metadata::{MetadataStore, SqliteStore};
use stash_server::{AppState, Metrics, create_router};
use stash_storage::{FilesystemBackend, ObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use super::fixtures::{MultipartBody, upload_request};

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, None, |storage| storage).await
    }

    /// Create a test server backed by a custom metadata store.
    pub async fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
        Self::build(|_| {}, Some(metadata), |storage| storage).await
    }

    /// Create a test server whose filesystem storage is wrapped by `wrap`.
    pub async fn with_storage<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        Self::build(|_| {}, None, wrap).await
    }

    async fn build<F, W>(modifier: F, metadata: Option<Arc<dyn MetadataStore>>, wrap: W) -> Self
    where
        F: FnOnce(&mut AppConfig),
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let public_path = temp_dir.path().join("web");
        std::fs::create_dir_all(&public_path).expect("Failed to create public directory");
        let storage: Arc<dyn ObjectStore> = wrap(Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        ));

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = match metadata {
            Some(metadata) => metadata,
            None => Arc::new(
                SqliteStore::new(&db_path)
                    .await
                    .expect("Failed to create metadata store"),
            ),
        };

        let mut config = AppConfig {
            server: ServerConfig {
                public_path,
                ..Default::default()
            },
            storage: StorageConfig::Filesystem {
                path: storage_path,
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
        };
        modifier(&mut config);

        let metrics = Metrics::new().expect("Failed to create metrics");
        let state = AppState::new(config, storage, metadata, metrics);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying storage.
    pub fn storage(&self) -> Arc<dyn ObjectStore> {
        self.state.storage.clone()
    }

    /// Directory served ahead of stored entries.
    pub fn public_path(&self) -> PathBuf {
        self.state.config.server.public_path.clone()
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request and collect the status, response and body.
    pub async fn send_collect(&self, request: Request<Body>) -> (StatusCode, Response, Vec<u8>) {
        let response = self.send(request).await;
        let status = response.status();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap().to_vec();
        (status, Response::from_parts(parts, Body::empty()), bytes)
    }

    /// Upload `data` as `filename` and return the redirect location.
    pub async fn upload(&self, filename: &str, data: &[u8]) -> String {
        let body = MultipartBody::new().file("file", filename, data).build();
        let (status, response, _) = self.send_collect(upload_request(body)).await;
        assert_eq!(status, StatusCode::SEE_OTHER, "upload of {filename} failed");
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }
}
