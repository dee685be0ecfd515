//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use sqlx::FromRow;
use stash_core::{ContentHash, Entry, Slug};
use time::OffsetDateTime;

// =============================================================================
// Entries
// =============================================================================

/// Stored file record.
#[derive(Debug, Clone, FromRow)]
pub struct EntryRow {
    pub slug: String,
    pub name: String,
    /// Unpadded base64url BLAKE3 digest of the blob.
    pub sum: String,
    pub size: i64,
    pub created_at: OffsetDateTime,
    /// `NULL` for entries that never expire.
    pub expires_at: Option<OffsetDateTime>,
}

impl EntryRow {
    /// Build the row persisted for `entry`.
    pub fn from_entry(entry: &Entry) -> MetadataResult<Self> {
        let size = i64::try_from(entry.size).map_err(|_| {
            MetadataError::Internal(format!("entry size {} out of range", entry.size))
        })?;

        Ok(Self {
            slug: entry.slug.to_string(),
            name: entry.name.clone(),
            sum: entry.sum.to_base64url(),
            size,
            created_at: entry.timestamp,
            expires_at: entry.lifetime,
        })
    }

    /// Convert back into the domain entry, validating stored fields.
    pub fn into_entry(self) -> MetadataResult<Entry> {
        let slug = Slug::parse(&self.slug)
            .map_err(|e| MetadataError::Corrupt(format!("entry {}: {e}", self.slug)))?;
        let sum = ContentHash::from_base64url(&self.sum)
            .map_err(|e| MetadataError::Corrupt(format!("entry {}: {e}", self.slug)))?;
        let size = u64::try_from(self.size).map_err(|_| {
            MetadataError::Corrupt(format!("entry {}: negative size {}", self.slug, self.size))
        })?;

        Ok(Entry {
            slug,
            name: self.name,
            sum,
            size,
            timestamp: self.created_at,
            lifetime: self.expires_at,
        })
    }
}
