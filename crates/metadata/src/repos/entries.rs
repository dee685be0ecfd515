//! Entry repository trait.

use crate::error::MetadataResult;
use crate::models::EntryRow;
use async_trait::async_trait;

/// Repository for stored file entries.
///
/// Entries are written once and never updated. Expiry is a read-side
/// concern; rows are returned whether or not their lifetime has passed.
#[async_trait]
pub trait EntryRepo: Send + Sync {
    /// Insert a new entry. Fails with `AlreadyExists` if the slug is taken.
    async fn create_entry(&self, entry: &EntryRow) -> MetadataResult<()>;

    /// Get an entry by slug.
    async fn get_entry(&self, slug: &str) -> MetadataResult<Option<EntryRow>>;

    /// Check whether an entry exists for a slug.
    async fn entry_exists(&self, slug: &str) -> MetadataResult<bool>;
}
