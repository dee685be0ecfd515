//! Content-type detection by signature sniffing.

use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Maximum number of bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 3072;

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const IMAGE_SVG: &str = "image/svg+xml";
const APPLICATION_JSON: &str = "application/json";

/// Tags that mark a document as HTML when they open it.
const HTML_TAGS: &[&[u8]] = &[
    b"<!doctype html",
    b"<html",
    b"<head",
    b"<script",
    b"<iframe",
    b"<h1",
    b"<div",
    b"<font",
    b"<table",
    b"<a",
    b"<style",
    b"<title",
    b"<b",
    b"<body",
    b"<br",
    b"<p",
    b"<!--",
];

/// Leading magic numbers of common binary and marked-up formats.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"<?xml", "text/xml; charset=utf-8"),
    (b"\xfe\xff", "text/plain; charset=utf-16be"),
    (b"\xff\xfe", "text/plain; charset=utf-16le"),
    (b"\xef\xbb\xbf", TEXT_PLAIN),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"\x1a\x45\xdf\xa3", "video/webm"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"\xff\xfb", "audio/mpeg"),
    (b"\xff\xf3", "audio/mpeg"),
    (b"\xff\xf2", "audio/mpeg"),
    (b"fLaC", "audio/flac"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"Rar!\x1a\x07", "application/x-rar-compressed"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\x00asm", "application/wasm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
];

/// RIFF-style containers: a four byte tag, a length, then the format tag.
const CONTAINERS: &[(&[u8; 4], &[u8], &str)] = &[
    (b"RIFF", b"WEBPVP", "image/webp"),
    (b"RIFF", b"WAVE", "audio/wave"),
    (b"RIFF", b"AVI ", "video/avi"),
    (b"FORM", b"AIFF", "audio/aiff"),
];

/// Read up to [`SNIFF_LEN`] bytes from `reader`, rewind it, and classify
/// the content.
///
/// The reader is always left at offset zero on success; a failed rewind is
/// an error because the body would otherwise be served truncated.
pub async fn detect_content_type<R>(name: &str, reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let mut buf = [0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    reader.seek(SeekFrom::Start(0)).await?;
    Ok(sniff(name, &buf[..filled]))
}

/// Classify `data`, falling back to the extension of `name` when the bytes
/// say nothing more specific than octet-stream.
pub fn sniff(name: &str, data: &[u8]) -> String {
    let detected = classify(data);
    if detected == OCTET_STREAM
        && let Some(mime) = mime_guess::from_path(name).first_raw()
    {
        return mime.to_string();
    }
    detected.to_string()
}

fn classify(data: &[u8]) -> &'static str {
    if is_html(data) {
        return TEXT_HTML;
    }
    if is_svg(data) {
        return IMAGE_SVG;
    }
    if let Some(mime) = match_signature(data) {
        return mime;
    }
    if is_text(data) {
        if is_json(data) {
            return APPLICATION_JSON;
        }
        return TEXT_PLAIN;
    }
    OCTET_STREAM
}

fn trim_start(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// An `<svg` root, either bare or after an XML prolog.
fn is_svg(data: &[u8]) -> bool {
    let data = trim_start(data);
    if starts_with_ignore_case(data, b"<svg") {
        return true;
    }
    starts_with_ignore_case(data, b"<?xml")
        && data
            .windows(4)
            .any(|window| window.eq_ignore_ascii_case(b"<svg"))
}

/// A JSON object or array. Brackets must balance outside strings, unless
/// the sniff window cut the document short.
fn is_json(data: &[u8]) -> bool {
    let data = trim_start(data);
    let (open, rest) = match data.split_first() {
        Some((&open @ (b'{' | b'['), rest)) => (open, rest),
        _ => return false,
    };
    let first = match trim_start(rest).first() {
        Some(&b) => b,
        None => return data.len() == SNIFF_LEN,
    };
    let plausible = match open {
        b'{' => matches!(first, b'"' | b'}'),
        _ => matches!(first, b'"' | b'{' | b'[' | b']' | b'-' | b'0'..=b'9' | b't' | b'f' | b'n'),
    };
    if !plausible {
        return false;
    }

    let mut depth = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in data.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth.push(b),
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                if depth.pop() != Some(expected) {
                    return false;
                }
                if depth.is_empty() {
                    return trim_start(&data[i + 1..]).is_empty();
                }
            }
            _ => {}
        }
    }
    data.len() == SNIFF_LEN
}

fn match_signature(data: &[u8]) -> Option<&'static str> {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Some(*mime);
    }
    let container = CONTAINERS.iter().find(|(tag, format, _)| {
        data.starts_with(*tag) && data.get(8..).is_some_and(|rest| rest.starts_with(format))
    });
    if let Some((_, _, mime)) = container {
        return Some(*mime);
    }
    // ISO base media: a box size, then `ftyp`.
    if data.get(4..8) == Some(b"ftyp".as_slice()) {
        return Some("video/mp4");
    }
    None
}

fn is_html(data: &[u8]) -> bool {
    let data = trim_start(data);

    HTML_TAGS.iter().any(|tag| {
        data.len() > tag.len()
            && data[..tag.len()].eq_ignore_ascii_case(tag)
            && (data[tag.len()] == b' ' || data[tag.len()] == b'>')
    })
}

fn is_text(data: &[u8]) -> bool {
    let valid = match std::str::from_utf8(data) {
        Ok(_) => true,
        // A multi-byte character cut off by the sniff window still counts.
        Err(e) => e.error_len().is_none() && data.len() == SNIFF_LEN,
    };
    valid
        && !data
            .iter()
            .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}

/// Replace an HTML media type with `text/plain`, keeping any parameters.
pub fn downgrade_html(content_type: &str) -> String {
    match content_type.strip_prefix("text/html") {
        Some(params) => format!("text/plain{params}"),
        None => content_type.to_string(),
    }
}
