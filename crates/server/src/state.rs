//! Application state shared across handlers.

use crate::metrics::Metrics;
use stash_core::config::AppConfig;
use stash_metadata::MetadataStore;
use stash_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Request counters, exposed on /varz.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        metrics: Metrics,
    ) -> Self {
        match config.server.lifetime() {
            Some(lifetime) => tracing::info!(lifetime = %lifetime, "Entries expire after upload"),
            None => tracing::info!("server.lifetime_secs is 0, entries never expire"),
        }

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            metrics: Arc::new(metrics),
        }
    }
}
