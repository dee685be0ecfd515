//! File-like views over stored entries.
//!
//! The file server only needs to stat, read, seek and close what it serves.
//! [`VirtualFile`] is that capability set; [`EntryFile`] provides it by
//! pairing an [`Entry`] (for stat facts) with an opened blob (for data).

use async_trait::async_trait;
use stash_core::Entry;
use stash_storage::BlobReader;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Permission bits reported for stored entries.
pub const ENTRY_MODE: u32 = 0o600;

/// Stat facts about a served file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub modified: OffsetDateTime,
    pub mode: u32,
    pub is_dir: bool,
}

/// Something the file server can stream.
#[async_trait]
pub trait VirtualFile: AsyncRead + AsyncSeek + Send + Unpin {
    fn stat(&self) -> FileStat;

    /// Directory entries; empty for anything that is not a directory.
    async fn read_dir(&mut self) -> io::Result<Vec<FileStat>> {
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> io::Result<()>;
}

/// A stored entry opened for reading.
pub struct EntryFile {
    entry: Entry,
    blob: Box<dyn BlobReader>,
}

impl EntryFile {
    pub fn new(entry: Entry, blob: Box<dyn BlobReader>) -> Self {
        Self { entry, blob }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl AsyncRead for EntryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.blob).poll_read(cx, buf)
    }
}

impl AsyncSeek for EntryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut *self.blob).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut *self.blob).poll_complete(cx)
    }
}

#[async_trait]
impl VirtualFile for EntryFile {
    fn stat(&self) -> FileStat {
        FileStat {
            name: self.entry.name.clone(),
            size: self.entry.size,
            modified: self.entry.timestamp,
            mode: ENTRY_MODE,
            is_dir: false,
        }
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        self.blob.close().await.map_err(io::Error::other)
    }
}
