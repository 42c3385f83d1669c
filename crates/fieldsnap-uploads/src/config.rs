//! Configuration management

use crate::storage::StorageConfig;
use fieldsnap_common::FieldsnapError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Concurrent workers started for each enqueued batch.
pub const DEFAULT_WORKERS_PER_BATCH: usize = 2;

/// Total transfer attempts per item (1 initial + 2 retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry; doubles for each further retry.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// How long a completed batch stays visible before eviction.
pub const DEFAULT_GRACE_SECS: u64 = 10;

// ============================================================================
// Compression Configuration Constants
// ============================================================================

/// Longest edge of a compressed photo, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// JPEG quality used when re-encoding photos.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/fieldsnap";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub compression: CompressionConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Worker pool, retry and eviction tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub workers_per_batch: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub grace_secs: u64,
    /// Optional cap on items in flight across all batches; unset means per-batch bounds only
    pub max_global_transfers: Option<usize>,
}

/// Image re-encoding settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `.env`, environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            storage: StorageConfig::from_env()?,
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            pipeline: PipelineConfig::from_env(),
            compression: CompressionConfig {
                max_dimension: env_or("COMPRESS_MAX_DIMENSION", DEFAULT_MAX_DIMENSION),
                jpeg_quality: env_or("COMPRESS_JPEG_QUALITY", DEFAULT_JPEG_QUALITY),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.storage.validate()?;

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        self.pipeline.validate()?;

        if self.compression.max_dimension == 0 {
            anyhow::bail!("Compression max_dimension must be greater than 0");
        }

        if !(1..=100).contains(&self.compression.jpeg_quality) {
            anyhow::bail!(
                "Compression jpeg_quality must be between 1 and 100, got {}",
                self.compression.jpeg_quality
            );
        }

        Ok(())
    }
}

impl PipelineConfig {
    /// Reads `UPLOAD_WORKERS_PER_BATCH`, `UPLOAD_MAX_ATTEMPTS`,
    /// `UPLOAD_BACKOFF_BASE_MS`, `UPLOAD_GRACE_SECS` and
    /// `UPLOAD_MAX_GLOBAL_TRANSFERS`.
    pub fn from_env() -> Self {
        Self {
            workers_per_batch: env_or("UPLOAD_WORKERS_PER_BATCH", DEFAULT_WORKERS_PER_BATCH),
            max_attempts: env_or("UPLOAD_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            backoff_base_ms: env_or("UPLOAD_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            grace_secs: env_or("UPLOAD_GRACE_SECS", DEFAULT_GRACE_SECS),
            max_global_transfers: std::env::var("UPLOAD_MAX_GLOBAL_TRANSFERS")
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn validate(&self) -> fieldsnap_common::Result<()> {
        if self.workers_per_batch == 0 {
            return Err(FieldsnapError::config("workers_per_batch must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(FieldsnapError::config("max_attempts must be greater than 0"));
        }
        // A zero window hides a batch the moment it completes
        if self.grace_secs == 0 {
            return Err(FieldsnapError::config("grace_secs must be greater than 0"));
        }
        if self.max_global_transfers == Some(0) {
            return Err(FieldsnapError::config(
                "max_global_transfers must be greater than 0 when set",
            ));
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers_per_batch: DEFAULT_WORKERS_PER_BATCH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            grace_secs: DEFAULT_GRACE_SECS,
            max_global_transfers: None,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}
