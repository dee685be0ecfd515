//! Repository traits for metadata operations.

pub mod entries;

pub use entries::EntryRepo;
