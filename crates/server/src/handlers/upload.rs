//! Upload endpoint.

use crate::error::{ApiError, ApiResult};
use crate::handlers::PATH_SEGMENT;
use crate::state::AppState;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_LENGTH, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::utf8_percent_encode;
use stash_core::entry::{base_name, extension, validate_name};
use stash_core::{Entry, Slug};
use stash_metadata::EntryRow;
use stash_storage::{StorageError, TeeUpload};
use std::time::Instant;
use time::OffsetDateTime;

/// Name of the multipart part carrying the file.
pub const FILE_FIELD: &str = "file";

/// Fresh slugs tried before giving up on a collision.
pub const MAX_SLUG_ATTEMPTS: u32 = 3;

/// POST / - Store the `file` part of a multipart form.
///
/// Responds `303 See Other` pointing at the new entry. The blob is fully
/// written before its entry is committed, and the entry is committed before
/// the response is sent.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let started = Instant::now();

    match receive(&state, &headers, multipart).await {
        Ok(location) => {
            state
                .metrics
                .upload_duration
                .observe(started.elapsed().as_secs_f64());
            (
                StatusCode::SEE_OTHER,
                [(LOCATION, location.clone())],
                format!("{location}\n"),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_upload_error(e.code());
            e.into_response()
        }
    }
}

async fn receive(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<String> {
    let limit = state.config.server.limit;
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge);
    }

    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from_multipart)?
    {
        if field.name() == Some(FILE_FIELD) {
            return store(state, field).await;
        }
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart part \"{FILE_FIELD}\""
    )))
}

async fn store(state: &AppState, mut field: Field<'_>) -> ApiResult<String> {
    let name = base_name(field.file_name().unwrap_or_default()).to_string();
    validate_name(&name)?;

    let (slug, upload) = create_blob(state).await?;
    let mut tee = TeeUpload::new(upload);

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                abort(tee, &slug).await;
                return Err(ApiError::from_multipart(e));
            }
        };
        if let Err(e) = tee.write(chunk).await {
            abort(tee, &slug).await;
            return Err(e.into());
        }
    }

    let (size, sum) = tee.finish().await?;

    let now = OffsetDateTime::now_utc();
    let entry = Entry {
        slug: slug.clone(),
        name,
        sum,
        size,
        timestamp: now,
        lifetime: state.config.server.lifetime().map(|lifetime| now + lifetime),
    };

    let committed = match EntryRow::from_entry(&entry) {
        Ok(row) => state.metadata.create_entry(&row).await,
        Err(e) => Err(e),
    };
    if let Err(e) = committed {
        // The blob stays behind without an entry; reconciliation is external.
        state.metrics.orphaned_blobs.inc();
        tracing::warn!(slug = %slug, size, error = %e, "Blob stored but entry commit failed");
        return Err(e.into());
    }

    state.metrics.uploads.inc();
    state.metrics.upload_bytes.inc_by(size);
    tracing::info!(slug = %slug, size, sum = %entry.sum, "Stored upload");

    Ok(format!(
        "/{}{}",
        slug,
        utf8_percent_encode(extension(&entry.name), PATH_SEGMENT)
    ))
}

/// Open a blob under a fresh slug, retrying when the slug is taken.
async fn create_blob(
    state: &AppState,
) -> ApiResult<(Slug, Box<dyn stash_storage::StreamingUpload>)> {
    let mut attempt = 1;
    loop {
        let slug = Slug::generate();
        match state.storage.create(slug.as_str()).await {
            Ok(upload) => return Ok((slug, upload)),
            Err(StorageError::AlreadyExists(_)) if attempt < MAX_SLUG_ATTEMPTS => {
                tracing::debug!(slug = %slug, attempt, "Slug already taken, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn abort(tee: TeeUpload, slug: &Slug) {
    if let Err(e) = tee.abort().await {
        tracing::warn!(slug = %slug, error = %e, "Failed to discard aborted upload");
    }
}
