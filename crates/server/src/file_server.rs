//! Static-content responses for any [`VirtualFile`].
//!
//! Handles validators, conditional requests, and single byte ranges. The
//! body is streamed from the file; nothing is buffered beyond the sniff
//! window.

use crate::content_type::detect_content_type;
use crate::error::{ApiError, ApiResult};
use crate::fs::VirtualFile;
use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_MATCH,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, LAST_MODIFIED, RANGE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use std::io::SeekFrom;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// IMF-fixdate, the preferred HTTP date format.
const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Format a timestamp as an HTTP date.
pub fn format_http_date(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(HTTP_DATE)
        .unwrap_or_default()
}

/// Parse an HTTP date in IMF-fixdate form.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Serve `file` in response to a GET or HEAD request.
///
/// `headers` are response headers already chosen by the caller; a preset
/// `Content-Type` or `ETag` is kept and used for validation.
pub async fn serve_file(
    method: &Method,
    request: &HeaderMap,
    mut headers: HeaderMap,
    mut file: Box<dyn VirtualFile>,
) -> ApiResult<Response> {
    let stat = file.stat();
    if stat.is_dir {
        file.close().await?;
        return Err(ApiError::NotFound);
    }

    // HTTP dates carry whole seconds; an epoch mtime means "unknown".
    let modified = stat
        .modified
        .replace_nanosecond(0)
        .ok()
        .filter(|m| m.unix_timestamp() > 0);
    if let Some(modified) = modified {
        insert(&mut headers, LAST_MODIFIED, format_http_date(modified))?;
    }

    if !headers.contains_key(CONTENT_TYPE) {
        let content_type = match mime_guess::from_path(&stat.name).first_raw() {
            Some(mime) => mime.to_string(),
            None => detect_content_type(&stat.name, &mut *file).await?,
        };
        insert(&mut headers, CONTENT_TYPE, content_type)?;
    }

    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match check_preconditions(method, request, etag.as_deref(), modified) {
        Precondition::Proceed => {}
        Precondition::NotModified => {
            file.close().await?;
            return Ok(not_modified(headers));
        }
        Precondition::Failed => {
            file.close().await?;
            return Err(ApiError::PreconditionFailed);
        }
    }

    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let size = stat.size;
    let range = match header_str(request, RANGE) {
        Some(spec) if if_range_allows(request, etag.as_deref(), modified) => {
            parse_range(spec, size)
        }
        _ => RangeOutcome::Full,
    };

    let (status, offset, length) = match range {
        RangeOutcome::Full => (StatusCode::OK, 0, size),
        RangeOutcome::Partial { start, end } => {
            insert(
                &mut headers,
                CONTENT_RANGE,
                format!("bytes {start}-{end}/{size}"),
            )?;
            (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
        }
        RangeOutcome::Unsatisfiable => {
            file.close().await?;
            return Err(ApiError::RangeNotSatisfiable { size });
        }
    };
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    let body = if method == Method::HEAD {
        file.close().await?;
        Body::empty()
    } else {
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Body::from_stream(ReaderStream::new(file.take(length)))
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: String) -> ApiResult<()> {
    let value = HeaderValue::try_from(value)
        .map_err(|e| ApiError::Internal(format!("invalid {name} header: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn not_modified(mut headers: HeaderMap) -> Response {
    headers.remove(CONTENT_TYPE);
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_ENCODING);
    if headers.contains_key(ETAG) {
        headers.remove(LAST_MODIFIED);
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    *response.headers_mut() = headers;
    response
}

#[derive(Debug, PartialEq, Eq)]
enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

fn check_preconditions(
    method: &Method,
    request: &HeaderMap,
    etag: Option<&str>,
    modified: Option<OffsetDateTime>,
) -> Precondition {
    let safe = method == Method::GET || method == Method::HEAD;

    if let Some(list) = header_str(request, IF_MATCH) {
        if !etag_list_matches(list, etag, true) {
            return Precondition::Failed;
        }
    } else if let Some(since) = header_str(request, IF_UNMODIFIED_SINCE).and_then(parse_http_date)
        && let Some(modified) = modified
        && modified > since
    {
        return Precondition::Failed;
    }

    if let Some(list) = header_str(request, IF_NONE_MATCH) {
        if etag_list_matches(list, etag, false) {
            return if safe {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
    } else if safe
        && let Some(since) = header_str(request, IF_MODIFIED_SINCE).and_then(parse_http_date)
        && let Some(modified) = modified
        && modified <= since
    {
        return Precondition::NotModified;
    }

    Precondition::Proceed
}

/// Whether a Range header may be honored given If-Range.
fn if_range_allows(request: &HeaderMap, etag: Option<&str>, modified: Option<OffsetDateTime>) -> bool {
    let Some(value) = header_str(request, IF_RANGE) else {
        return true;
    };
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/") {
        return etag.is_some_and(|etag| etag_matches(value, etag, true));
    }
    match (parse_http_date(value), modified) {
        (Some(date), Some(modified)) => date == modified,
        _ => false,
    }
}

fn etag_list_matches(list: &str, etag: Option<&str>, strong: bool) -> bool {
    if list.trim() == "*" {
        return true;
    }
    let Some(etag) = etag else {
        return false;
    };
    list.split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| etag_matches(candidate, etag, strong))
}

fn etag_matches(a: &str, b: &str, strong: bool) -> bool {
    if strong {
        !a.starts_with("W/") && !b.starts_with("W/") && a == b
    } else {
        a.trim_start_matches("W/") == b.trim_start_matches("W/")
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    Full,
    /// Inclusive byte positions.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parse a Range header against a representation of `size` bytes.
///
/// Only a single range is served partially; a set of several ranges falls
/// back to the full body.
fn parse_range(header: &str, size: u64) -> RangeOutcome {
    let Some(set) = header.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Unsatisfiable;
    };
    let specs: Vec<&str> = set
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    match specs.as_slice() {
        [] => RangeOutcome::Unsatisfiable,
        [spec] => parse_range_spec(spec, size).unwrap_or(RangeOutcome::Unsatisfiable),
        _ => RangeOutcome::Full,
    }
}

fn parse_range_spec(spec: &str, size: u64) -> Option<RangeOutcome> {
    let (first, last) = spec.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the final `last` bytes.
        let suffix: u64 = last.parse().ok()?;
        if suffix == 0 || size == 0 {
            return None;
        }
        let start = size.saturating_sub(suffix);
        return Some(RangeOutcome::Partial {
            start,
            end: size - 1,
        });
    }

    let start: u64 = first.parse().ok()?;
    if start >= size {
        return None;
    }
    let end = if last.is_empty() {
        size - 1
    } else {
        let end: u64 = last.parse().ok()?;
        if end < start {
            return None;
        }
        end.min(size - 1)
    };
    Some(RangeOutcome::Partial { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileStat;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use time::macros::datetime;
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    struct MemoryFile {
        data: Cursor<Vec<u8>>,
        name: &'static str,
        modified: OffsetDateTime,
    }

    impl AsyncRead for MemoryFile {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.data).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for MemoryFile {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
            Pin::new(&mut self.data).start_seek(position)
        }

        fn poll_complete(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<u64>> {
            Pin::new(&mut self.data).poll_complete(cx)
        }
    }

    #[async_trait]
    impl VirtualFile for MemoryFile {
        fn stat(&self) -> FileStat {
            FileStat {
                name: self.name.to_string(),
                size: self.data.get_ref().len() as u64,
                modified: self.modified,
                mode: 0o600,
                is_dir: false,
            }
        }

        async fn close(self: Box<Self>) -> std::io::Result<()> {
            Ok(())
        }
    }

    const MODIFIED: OffsetDateTime = datetime!(2024-03-05 10:20:30.5 UTC);

    fn file(data: &[u8]) -> Box<dyn VirtualFile> {
        Box::new(MemoryFile {
            data: Cursor::new(data.to_vec()),
            name: "notes.txt",
            modified: MODIFIED,
        })
    }

    fn request(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn tagged() -> HeaderMap {
        request(&[(ETAG, "\"abc\"")])
    }

    async fn body(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_http_date_roundtrip() {
        let formatted = format_http_date(datetime!(1994-11-06 08:49:37 UTC));
        assert_eq!(formatted, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(
            parse_http_date(&formatted),
            Some(datetime!(1994-11-06 08:49:37 UTC))
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_range("bytes=0-4", 10),
            RangeOutcome::Partial { start: 0, end: 4 }
        );
        assert_eq!(
            parse_range("bytes=6-", 10),
            RangeOutcome::Partial { start: 6, end: 9 }
        );
        assert_eq!(
            parse_range("bytes=-3", 10),
            RangeOutcome::Partial { start: 7, end: 9 }
        );
        assert_eq!(
            parse_range("bytes=-30", 10),
            RangeOutcome::Partial { start: 0, end: 9 }
        );
        assert_eq!(
            parse_range("bytes=5-100", 10),
            RangeOutcome::Partial { start: 5, end: 9 }
        );
        assert_eq!(parse_range("bytes=10-", 10), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("bytes=4-2", 10), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("items=0-1", 10), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("bytes=x-1", 10), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-0", 0), RangeOutcome::Unsatisfiable);
        assert_eq!(parse_range("bytes=0-1,4-5", 10), RangeOutcome::Full);
    }

    #[tokio::test]
    async fn test_full_response() {
        let response = serve_file(&Method::GET, &HeaderMap::new(), tagged(), file(b"hello world"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_LENGTH], "11");
        assert_eq!(headers[ACCEPT_RANGES], "bytes");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
        assert_eq!(headers[LAST_MODIFIED], "Tue, 05 Mar 2024 10:20:30 GMT");
        assert_eq!(body(response).await, b"hello world");
    }

    #[tokio::test]
    async fn test_preset_content_type_kept() {
        let mut headers = tagged();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        let response = serve_file(&Method::GET, &HeaderMap::new(), headers, file(b"x"))
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let response = serve_file(&Method::HEAD, &HeaderMap::new(), tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert!(body(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_if_none_match() {
        for value in ["\"abc\"", "W/\"abc\"", "\"zzz\", \"abc\"", "*"] {
            let req = request(&[(IF_NONE_MATCH, value)]);
            let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_MODIFIED, "{value}");
            assert!(response.headers().get(CONTENT_TYPE).is_none());
            assert!(response.headers().get(LAST_MODIFIED).is_none());
            assert_eq!(response.headers()[ETAG], "\"abc\"");
        }

        let req = request(&[(IF_NONE_MATCH, "\"other\"")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_if_modified_since() {
        let req = request(&[(IF_MODIFIED_SINCE, "Tue, 05 Mar 2024 10:20:30 GMT")]);
        let response = serve_file(&Method::GET, &req, HeaderMap::new(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let req = request(&[(IF_MODIFIED_SINCE, "Tue, 05 Mar 2024 10:20:29 GMT")]);
        let response = serve_file(&Method::GET, &req, HeaderMap::new(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_if_none_match_overrides_if_modified_since() {
        let req = request(&[
            (IF_NONE_MATCH, "\"other\""),
            (IF_MODIFIED_SINCE, "Tue, 05 Mar 2024 10:20:30 GMT"),
        ]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failed_preconditions() {
        let req = request(&[(IF_MATCH, "\"other\"")]);
        let err = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PreconditionFailed));

        let req = request(&[(IF_UNMODIFIED_SINCE, "Mon, 04 Mar 2024 00:00:00 GMT")]);
        let err = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PreconditionFailed));

        let req = request(&[(IF_MATCH, "\"abc\"")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_partial_content() {
        let req = request(&[(RANGE, "bytes=6-10")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello world"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 6-10/11");
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
        assert_eq!(body(response).await, b"world");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let req = request(&[(RANGE, "bytes=50-")]);
        let err = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RangeNotSatisfiable { size: 5 }));
    }

    #[tokio::test]
    async fn test_if_range() {
        let req = request(&[(RANGE, "bytes=0-0"), (IF_RANGE, "\"abc\"")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let req = request(&[(RANGE, "bytes=0-0"), (IF_RANGE, "\"stale\"")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, b"hello");

        let req = request(&[
            (RANGE, "bytes=0-0"),
            (IF_RANGE, "Tue, 05 Mar 2024 10:20:30 GMT"),
        ]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }

    #[tokio::test]
    async fn test_multiple_ranges_serve_full_body() {
        let req = request(&[(RANGE, "bytes=0-0,2-3")]);
        let response = serve_file(&Method::GET, &req, tagged(), file(b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, b"hello");
    }
}
