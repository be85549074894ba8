//! Configuration for the ingestion server

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::processing::FileTier;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "PDF_INGEST_CONFIG";
/// Environment override for `server.port`
pub const PORT_ENV: &str = "PDF_INGEST_PORT";
/// Environment override for `storage.data_dir`
pub const DATA_DIR_ENV: &str = "PDF_INGEST_DATA_DIR";
/// Hard ceiling on the worker limit
pub const MAX_CONCURRENCY: usize = 10;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Task database and upload locations
    pub storage: StorageConfig,
    /// Scheduler configuration
    pub queue: QueueConfig,
    /// Extraction timeouts
    pub extraction: ExtractionConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `PDF_INGEST_CONFIG` if set, otherwise defaults, then apply
    /// the individual environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => Self::default(),
        };

        if let Ok(port) = std::env::var(PORT_ENV) {
            config.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {}: {}", PORT_ENV, e)))?;
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.storage.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue cannot run with
    pub fn validate(&self) -> Result<()> {
        let queue = &self.queue;
        if queue.max_concurrency == 0 || queue.max_concurrency > MAX_CONCURRENCY {
            return Err(Error::Config(format!(
                "queue.max_concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if queue.concurrency == 0 || queue.concurrency > queue.max_concurrency {
            return Err(Error::Config(format!(
                "queue.concurrency must be between 1 and {}",
                queue.max_concurrency
            )));
        }
        if self.extraction.timeout_secs == 0 {
            return Err(Error::Config("extraction.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// Where task state and uploaded files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory
    pub data_dir: PathBuf,
    /// Task database file name, relative to `data_dir`
    pub db_file: String,
    /// Upload directory; relative paths are resolved against `data_dir`
    pub upload_dir: PathBuf,
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn upload_path(&self) -> PathBuf {
        if self.upload_dir.is_absolute() {
            self.upload_dir.clone()
        } else {
            self.data_dir.join(&self.upload_dir)
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdf-ingest");

        Self {
            data_dir,
            db_file: "db.json".to_string(),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Initial worker limit when the store has no saved settings
    pub concurrency: usize,
    /// Upper bound accepted by `set_concurrency`
    pub max_concurrency: usize,
    /// Extra time past the extraction timeout before a busy pool counts as stalled
    pub stall_grace_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_concurrency: MAX_CONCURRENCY,
            stall_grace_secs: 30,
        }
    }
}

/// Extraction timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Timeout when tiering is disabled, in seconds
    pub timeout_secs: u64,
    /// Derive timeouts from file size and PDF complexity
    pub tiered: bool,
    /// Cap for files under 10MB (default: 120s)
    pub fast_timeout_secs: u64,
    /// Cap for files under 100MB (default: 300s)
    pub medium_timeout_secs: u64,
    /// Cap for larger files (default: 900s)
    pub heavy_timeout_secs: u64,
    /// Cap for scanned or encrypted PDFs (default: 1200s)
    pub complex_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            tiered: true,
            fast_timeout_secs: 120,
            medium_timeout_secs: 300,
            heavy_timeout_secs: 900,
            complex_timeout_secs: 1200,
        }
    }
}

impl ExtractionConfig {
    /// Timeout cap for a given tier
    pub fn timeout_for_tier(&self, tier: FileTier) -> Duration {
        let secs = match tier {
            FileTier::Fast => self.fast_timeout_secs,
            FileTier::Medium => self.medium_timeout_secs,
            FileTier::Heavy => self.heavy_timeout_secs,
            FileTier::Complex => self.complex_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    /// Longest timeout any extraction may get
    pub fn max_timeout(&self) -> Duration {
        let secs = if self.tiered {
            self.fast_timeout_secs
                .max(self.medium_timeout_secs)
                .max(self.heavy_timeout_secs)
                .max(self.complex_timeout_secs)
        } else {
            self.timeout_secs
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.concurrency, 1);
        assert_eq!(config.queue.max_concurrency, 10);
        assert!(config.storage.db_path().ends_with("db.json"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [storage]
            data_dir = "/var/lib/pdf-ingest"
            upload_dir = "/srv/uploads"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.db_path(), PathBuf::from("/var/lib/pdf-ingest/db.json"));
        assert_eq!(config.storage.upload_path(), PathBuf::from("/srv/uploads"));
        assert_eq!(config.extraction.timeout_secs, 120);
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let mut config = IngestConfig::default();
        config.queue.concurrency = 11;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_max_concurrency_capped() {
        let mut config = IngestConfig::default();
        config.queue.max_concurrency = 20;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.queue.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.queue.max_concurrency = 4;
        config.queue.concurrency = 4;
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[queue]\nconcurrency = 3\n").unwrap();

        let config = IngestConfig::load(&path).unwrap();
        assert_eq!(config.queue.concurrency, 3);

        assert!(IngestConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_tier_timeouts() {
        let config = ExtractionConfig::default();
        assert_eq!(config.timeout_for_tier(FileTier::Fast), Duration::from_secs(120));
        assert_eq!(config.timeout_for_tier(FileTier::Complex), Duration::from_secs(1200));
        assert_eq!(config.max_timeout(), Duration::from_secs(1200));
    }
}
