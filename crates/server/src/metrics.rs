//! Prometheus metrics for the stash server.
//!
//! Each [`Metrics`] owns its registry, so several routers (for example in
//! tests) can coexist in one process. The `/varz` endpoint is
//! unauthenticated; restrict it at the network level when exposed.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Upload and serve counters plus the registry they are exposed through.
pub struct Metrics {
    registry: Registry,
    /// Uploads that produced an entry.
    pub uploads: IntCounter,
    /// Bytes accepted by successful uploads.
    pub upload_bytes: IntCounter,
    /// Failed uploads by error code.
    pub upload_errors: IntCounterVec,
    /// Time from request start to redirect for successful uploads.
    pub upload_duration: Histogram,
    /// Entries served (full or partial responses).
    pub downloads: IntCounter,
    /// Requests answered with 404.
    pub not_found: IntCounter,
    /// Blobs written without a matching entry.
    pub orphaned_blobs: IntCounter,
}

impl Metrics {
    /// Create the counters and register them, with process metrics on Linux.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let uploads = IntCounter::new("stash_uploads_total", "Total number of completed uploads")?;
        let upload_bytes = IntCounter::new(
            "stash_upload_bytes_total",
            "Total bytes stored by completed uploads",
        )?;
        let upload_errors = IntCounterVec::new(
            Opts::new("stash_upload_errors_total", "Total upload errors by error type"),
            &["type"],
        )?;
        let upload_duration = Histogram::with_opts(
            HistogramOpts::new(
                "stash_upload_duration_seconds",
                "Time taken to receive, store and commit an upload",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let downloads = IntCounter::new("stash_downloads_total", "Total number of entries served")?;
        let not_found = IntCounter::new(
            "stash_not_found_total",
            "Total requests for absent or expired entries",
        )?;
        let orphaned_blobs = IntCounter::new(
            "stash_orphaned_blobs_total",
            "Total blobs stored whose entry could not be committed",
        )?;

        registry.register(Box::new(uploads.clone()))?;
        registry.register(Box::new(upload_bytes.clone()))?;
        registry.register(Box::new(upload_errors.clone()))?;
        registry.register(Box::new(upload_duration.clone()))?;
        registry.register(Box::new(downloads.clone()))?;
        registry.register(Box::new(not_found.clone()))?;
        registry.register(Box::new(orphaned_blobs.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            uploads,
            upload_bytes,
            upload_errors,
            upload_duration,
            downloads,
            not_found,
            orphaned_blobs,
        })
    }

    /// Record a failed upload by error type.
    pub fn record_upload_error(&self, error_type: &str) {
        self.upload_errors.with_label_values(&[error_type]).inc();
    }

    /// Encode all registered metrics in the text exposition format.
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// GET /varz - Prometheus metrics endpoint.
pub async fn varz(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
