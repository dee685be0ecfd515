//! Metadata store trait and implementations.

use crate::error::{MetadataResult, map_insert_error};
use crate::models::EntryRow;
use crate::repos::EntryRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: EntryRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite serializes writers; a single connection avoids lock contention
            // between concurrent upload commits.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store opened");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;

    #[async_trait]
    impl EntryRepo for SqliteStore {
        async fn create_entry(&self, entry: &EntryRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO entries (slug, name, sum, size, created_at, expires_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.slug)
            .bind(&entry.name)
            .bind(&entry.sum)
            .bind(entry.size)
            .bind(entry.created_at)
            .bind(entry.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &entry.slug))?;
            Ok(())
        }

        async fn get_entry(&self, slug: &str) -> MetadataResult<Option<EntryRow>> {
            let row = sqlx::query_as::<_, EntryRow>(
                "SELECT slug, name, sum, size, created_at, expires_at FROM entries WHERE slug = ?",
            )
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn entry_exists(&self, slug: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM entries WHERE slug = ?)")
                    .bind(slug)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Stored file entries, written once per successful upload
CREATE TABLE IF NOT EXISTS entries (
    slug TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sum TEXT NOT NULL,
    size INTEGER NOT NULL CHECK (size >= 0),
    created_at TEXT NOT NULL,
    expires_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_entries_expires_at ON entries(expires_at) WHERE expires_at IS NOT NULL;
"#;
