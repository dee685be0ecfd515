//! Stored file entries.

use crate::hash::ContentHash;
use crate::slug::Slug;
use time::{Duration, OffsetDateTime};

/// Maximum length of an uploaded file name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Description of one stored file.
///
/// `sum` and `size` always describe the bytes committed to blob storage
/// under `slug`, never anything the client claimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub slug: Slug,
    pub name: String,
    pub sum: ContentHash,
    pub size: u64,
    pub timestamp: OffsetDateTime,
    /// Absolute expiry instant. `None` never expires.
    pub lifetime: Option<OffsetDateTime>,
}

impl Entry {
    /// Whether the entry must be treated as absent at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.lifetime.is_some_and(|lifetime| now >= lifetime)
    }

    /// Time left before expiry, clamped at zero. `None` never expires.
    pub fn remaining_at(&self, now: OffsetDateTime) -> Option<Duration> {
        self.lifetime
            .map(|lifetime| (lifetime - now).max(Duration::ZERO))
    }
}

/// Reduce a client-supplied file name to its final path component.
pub fn base_name(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
}

/// Validate an uploaded file name.
pub fn validate_name(name: &str) -> crate::Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(crate::Error::InvalidName(format!(
            "name is {} bytes, limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}

/// Extension of a file name including the leading dot, or `""`.
///
/// Only the last dot of the final path component counts, so
/// `report.final.pdf` yields `.pdf`.
pub fn extension(name: &str) -> &str {
    let base = base_name(name);
    base.rfind('.').map_or("", |i| &base[i..])
}
