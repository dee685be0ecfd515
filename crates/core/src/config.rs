//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes, multipart framing included.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Lifetime of new entries in seconds. Zero (the default) keeps
    /// entries forever.
    #[serde(default)]
    pub lifetime_secs: u64,
    /// Directory of static assets served ahead of stored entries.
    #[serde(default = "default_public_path")]
    pub public_path: PathBuf,
    /// Enable the /varz endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_limit() -> u64 {
    crate::DEFAULT_UPLOAD_LIMIT
}

fn default_public_path() -> PathBuf {
    PathBuf::from("./web")
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            limit: default_limit(),
            lifetime_secs: 0,
            public_path: default_public_path(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Lifetime applied to new entries, `None` when entries never expire.
    pub fn lifetime(&self) -> Option<Duration> {
        if self.lifetime_secs == 0 {
            return None;
        }
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.lifetime_secs).unwrap_or(i64::MAX);
        Some(Duration::seconds(secs))
    }

    /// Upload limit as a `usize` for body limiting layers.
    pub fn limit_bytes(&self) -> usize {
        usize::try_from(self.limit).unwrap_or(usize::MAX)
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("server.limit must be greater than zero".to_string());
        }

        // Expiry instants are computed as now + lifetime; keep that sum representable.
        if self.lifetime_secs > MAX_LIFETIME_SECS {
            return Err(format!(
                "server.lifetime_secs {} exceeds maximum value {}",
                self.lifetime_secs, MAX_LIFETIME_SECS
            ));
        }

        Ok(())
    }
}

/// Roughly 1000 years, well inside the range `OffsetDateTime` can represent.
const MAX_LIFETIME_SECS: u64 = 1000 * 365 * 86400;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty 'path'".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer STASH_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Validate every section, returning the first failure.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.limit, 150 * 1024 * 1024);
        assert_eq!(config.lifetime_secs, 0);
        assert!(config.lifetime().is_none());
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_zero_lifetime_means_forever() {
        let config = ServerConfig {
            lifetime_secs: 0,
            ..Default::default()
        };
        assert!(config.lifetime().is_none());

        let config = ServerConfig {
            lifetime_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.lifetime(), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_server_config_validate() {
        let config = ServerConfig {
            limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            lifetime_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_server_config_partial_deserialize() {
        let json = r#"{"limit": 1024, "public_path": "/srv/www"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.limit, 1024);
        assert_eq!(config.public_path, PathBuf::from("/srv/www"));
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.lifetime_secs, 0);
    }

    #[test]
    fn test_absent_lifetime_is_forever() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.lifetime().is_none());

        let config: ServerConfig = serde_json::from_str(r#"{"lifetime_secs": 3600}"#).unwrap();
        assert_eq!(config.lifetime(), Some(Duration::hours(1)));
    }

    #[test]
    fn test_metadata_config_tagged() {
        let json = r#"{"type":"postgres","url":"postgres://localhost/stash"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match &config {
            MetadataConfig::Postgres {
                url,
                port,
                max_connections,
                ..
            } => {
                assert_eq!(url.as_deref(), Some("postgres://localhost/stash"));
                assert_eq!(*port, Some(5432));
                assert_eq!(*max_connections, 10);
            }
            _ => panic!("expected postgres config"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_metadata_config_postgres_requires_database() {
        let config = MetadataConfig::Postgres {
            url: None,
            host: Some("db".to_string()),
            port: None,
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 4,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_roundtrip() {
        let config = StorageConfig::Filesystem {
            path: PathBuf::from("/var/lib/stash"),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""type":"filesystem""#));

        let decoded: StorageConfig = serde_json::from_str(&json).unwrap();
        let StorageConfig::Filesystem { path } = decoded;
        assert_eq!(path, PathBuf::from("/var/lib/stash"));
    }
}
