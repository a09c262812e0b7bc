use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::{Reading, Source, User};

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

pub use memory::MemoryRepository;
#[cfg(feature = "db")]
pub use pg::PgRepository;

/// Errors raised by a storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad interval: start {start} is after end {end}")]
    BadInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub(crate) fn check_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StorageError> {
    if start > end {
        return Err(StorageError::BadInterval { start, end });
    }
    Ok(())
}

/// Contract every persistence engine implements.
///
/// The derivation engine talks to storage only through this trait, so the
/// same aggregation results come out of every backend. Range queries are
/// inclusive on both ends and ordered by timestamp; collections of sources
/// and users are ordered by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_source(&self, name: &str) -> Result<Option<Source>, StorageError>;
    async fn get_sources(&self) -> Result<Vec<Source>, StorageError>;
    async fn get_source_index(&self) -> Result<Vec<String>, StorageError>;
    /// Fails with `Conflict` when the name exists and `overwrite` is false.
    async fn store_source(&self, source: &Source, overwrite: bool) -> Result<(), StorageError>;
    /// Removes the source together with all of its readings.
    async fn delete_source(&self, name: &str) -> Result<(), StorageError>;

    async fn get_reading(
        &self,
        source: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError>;
    /// Nearest reading with `timestamp <= at`.
    async fn reading_at_or_before(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError>;
    /// Nearest reading with `timestamp >= at`.
    async fn reading_at_or_after(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError>;
    async fn latest_reading(&self, source: &str) -> Result<Option<Reading>, StorageError>;
    async fn get_reading_index(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError>;
    async fn get_readings(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError>;
    /// Fails with `Conflict` on a duplicate `(source, timestamp)` key.
    async fn store_reading(&self, reading: &Reading) -> Result<(), StorageError>;
    async fn delete_reading(&self, source: &str, timestamp: DateTime<Utc>) -> Result<(), StorageError>;
    /// Deletes every reading of `source`, returning how many were removed.
    async fn delete_readings(&self, source: &str) -> Result<u64, StorageError>;

    async fn get_user(&self, username: &str) -> Result<Option<User>, StorageError>;
    async fn get_users(&self) -> Result<Vec<User>, StorageError>;
    async fn store_user(&self, user: &User, overwrite: bool) -> Result<(), StorageError>;
    async fn delete_user(&self, username: &str) -> Result<(), StorageError>;
}

/// Open the configured storage engine.
pub async fn connect(cfg: &StorageConfig) -> Result<Arc<dyn Repository>> {
    match cfg.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryRepository::new()))
        }
        #[cfg(feature = "db")]
        StorageBackend::Postgres => {
            let url = cfg
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("storage.url is required for the postgres backend"))?;
            let repo = PgRepository::connect(url, cfg.max_connections).await?;
            repo.ensure_schema().await?;
            info!("using postgres storage");
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "db"))]
        StorageBackend::Postgres => {
            anyhow::bail!("postgres storage requires building with the `db` feature")
        }
    }
}
