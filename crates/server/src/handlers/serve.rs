//! Download path: static assets first, then stored entries by slug.

use crate::content_type::{detect_content_type, downgrade_html};
use crate::error::{ApiError, ApiResult};
use crate::file_server::{format_http_date, parse_http_date, serve_file};
use crate::fs::{EntryFile, VirtualFile};
use crate::handlers::PATH_SEGMENT;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_METHODS, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, ETAG, EXPIRES, LAST_MODIFIED, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use stash_core::{CACHE_FOREVER_SECS, Slug};
use std::path::Path;
use time::OffsetDateTime;
use tower::ServiceExt;
use tower_http::services::ServeDir;

const ALLOW: &str = "GET, HEAD, OPTIONS";
const ALLOW_ROOT: &str = "GET, HEAD, OPTIONS, POST";

/// Fallback for every request not claimed by a dedicated route.
///
/// GET and HEAD go to the serving pipeline; OPTIONS reports the allowed
/// methods; anything else is 405.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let allow = if request.uri().path() == "/" { ALLOW_ROOT } else { ALLOW };

    if method == Method::GET || method == Method::HEAD {
        return match serve(&state, request).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, ApiError::NotFound) {
                    state.metrics.not_found.inc();
                }
                e.into_response()
            }
        };
    }

    if method == Method::OPTIONS {
        return (
            StatusCode::OK,
            [(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(allow))],
        )
            .into_response();
    }

    ApiError::MethodNotAllowed { allow }.into_response()
}

/// Serve a static asset or, failing that, a stored entry.
pub async fn serve(state: &AppState, request: Request) -> ApiResult<Response> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();

    if let Some(response) = serve_static(&state.config.server.public_path, request).await {
        return Ok(response);
    }

    let path = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| ApiError::NotFound)?;
    serve_entry(state, &method, &path, &headers).await
}

/// Serve `request` from the public directory.
///
/// Returns `None` when nothing there matches, so stored entries are only
/// consulted after static assets.
async fn serve_static(root: &Path, request: Request) -> Option<Response> {
    // A directory request resolves to its index.html, which is not cached.
    let is_index = request.uri().path().ends_with('/');

    let response = match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if response.status() == StatusCode::NOT_FOUND {
        return None;
    }

    let mut response = response.map(Body::new);
    let cacheable = matches!(
        response.status(),
        StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED
    );
    if cacheable && !is_index {
        let headers = response.headers_mut();
        if let Ok(cache_control) = header_value(format!("max-age={CACHE_FOREVER_SECS}")) {
            headers.insert(CACHE_CONTROL, cache_control);
        }
        if let Some(etag) = static_etag(headers).and_then(|v| HeaderValue::try_from(v).ok()) {
            headers.insert(ETAG, etag);
        }
    }
    Some(response)
}

/// nginx-style weak validator: `W/"<mtime hex>-<size hex>"`.
fn static_etag(headers: &HeaderMap) -> Option<String> {
    let modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)?;
    let size: u64 = match headers.get(CONTENT_RANGE) {
        Some(range) => range.to_str().ok()?.rsplit('/').next()?.parse().ok()?,
        None => headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()?,
    };
    Some(format!("W/\"{:x}-{:x}\"", modified.unix_timestamp(), size))
}

async fn serve_entry(
    state: &AppState,
    method: &Method,
    path: &str,
    request: &HeaderMap,
) -> ApiResult<Response> {
    let name = path.strip_prefix('/').unwrap_or(path);
    if name.contains('/') {
        return Err(ApiError::NotFound);
    }
    let slug = Slug::from_request_name(name).map_err(|_| ApiError::NotFound)?;

    let row = state
        .metadata
        .get_entry(slug.as_str())
        .await?
        .ok_or(ApiError::NotFound)?;
    let entry = row.into_entry()?;

    let now = OffsetDateTime::now_utc();
    if entry.is_expired_at(now) {
        return Err(ApiError::NotFound);
    }

    let mut headers = HeaderMap::new();
    match entry.lifetime {
        None => {
            headers.insert(
                CACHE_CONTROL,
                header_value(format!("public, max-age={CACHE_FOREVER_SECS}, immutable"))?,
            );
        }
        Some(lifetime) => {
            let remaining = entry
                .remaining_at(now)
                .map(|d| d.whole_seconds())
                .unwrap_or(0);
            headers.insert(
                CACHE_CONTROL,
                header_value(format!("public, must-revalidate, max-age={remaining}"))?,
            );
            headers.insert(EXPIRES, header_value(format_http_date(lifetime))?);
        }
    }

    let blob = state.storage.open(slug.as_str()).await?;
    let file_name = entry.name.clone();
    let mut file = EntryFile::new(entry, blob);
    let content_type = detect_content_type(&file_name, &mut file).await?;

    let entry = file.entry();
    let escaped = utf8_percent_encode(&entry.name, PATH_SEGMENT).to_string();
    headers.insert(
        CONTENT_DISPOSITION,
        header_value(format!("filename=\"{escaped}\"; filename*=UTF-8''{escaped}"))?,
    );
    headers.insert(CONTENT_TYPE, header_value(downgrade_html(&content_type))?);
    headers.insert(ETAG, header_value(format!("\"{}\"", entry.sum))?);
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    tracing::debug!(slug = %slug, size = entry.size, "Serving entry");
    state.metrics.downloads.inc();

    serve_file(method, request, headers, Box::new(file)).await
}

fn header_value(value: String) -> ApiResult<HeaderValue> {
    HeaderValue::try_from(value).map_err(|e| ApiError::Internal(format!("invalid header: {e}")))
}
