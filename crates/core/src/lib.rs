//! Core domain types and shared logic for stash.
//!
//! This crate defines the data model used across all other crates:
//! - Entry slugs and their generation
//! - Content digests computed while blobs are written
//! - Entries and their lifetime rules
//! - Configuration

pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod slug;

pub use entry::{Entry, MAX_NAME_LEN};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use slug::Slug;

/// Default upload limit: 150 MiB
pub const DEFAULT_UPLOAD_LIMIT: u64 = 150 * 1024 * 1024;

/// Cache lifetime for immutable responses: about one year, in seconds.
pub const CACHE_FOREVER_SECS: u64 = 31_536_000;
