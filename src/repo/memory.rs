//! In-memory storage engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::{check_interval, Repository, StorageError};
use crate::domain::{Reading, Source, User};

#[derive(Debug, Default)]
struct Tables {
    sources: BTreeMap<String, Source>,
    readings: HashMap<String, BTreeMap<DateTime<Utc>, Reading>>,
    users: BTreeMap<String, User>,
}

/// Repository keeping everything in ordered maps behind a single lock.
///
/// No lock is held across an await point, so a blocking lock is fine here.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_source(&self, name: &str) -> Result<Option<Source>, StorageError> {
        Ok(self.tables.read().sources.get(name).cloned())
    }

    async fn get_sources(&self) -> Result<Vec<Source>, StorageError> {
        Ok(self.tables.read().sources.values().cloned().collect())
    }

    async fn get_source_index(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.tables.read().sources.keys().cloned().collect())
    }

    async fn store_source(&self, source: &Source, overwrite: bool) -> Result<(), StorageError> {
        source
            .validate()
            .map_err(|e| StorageError::Invalid(e.to_string()))?;

        let mut tables = self.tables.write();
        if !overwrite && tables.sources.contains_key(&source.name) {
            return Err(StorageError::Conflict(format!("source {}", source.name)));
        }
        tables.sources.insert(source.name.clone(), source.clone());
        info!(source = %source.name, virtual_source = source.is_virtual, "stored source");
        Ok(())
    }

    async fn delete_source(&self, name: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        if tables.sources.remove(name).is_none() {
            return Err(StorageError::NotFound(format!("source {}", name)));
        }
        let dropped = tables.readings.remove(name).map(|r| r.len()).unwrap_or(0);
        info!(source = %name, readings = dropped, "deleted source");
        Ok(())
    }

    async fn get_reading(
        &self,
        source: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .and_then(|series| series.get(&timestamp))
            .cloned())
    }

    async fn reading_at_or_before(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .and_then(|series| series.range(..=at).next_back())
            .map(|(_, r)| r.clone()))
    }

    async fn reading_at_or_after(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .and_then(|series| series.range(at..).next())
            .map(|(_, r)| r.clone()))
    }

    async fn latest_reading(&self, source: &str) -> Result<Option<Reading>, StorageError> {
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .and_then(|series| series.values().next_back())
            .cloned())
    }

    async fn get_reading_index(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        check_interval(start, end)?;
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .map(|series| series.range(start..=end).map(|(ts, _)| *ts).collect())
            .unwrap_or_default())
    }

    async fn get_readings(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        check_interval(start, end)?;
        Ok(self
            .tables
            .read()
            .readings
            .get(source)
            .map(|series| series.range(start..=end).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn store_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        if reading.interpolated {
            return Err(StorageError::Invalid(format!(
                "reading for {} at {} is interpolated",
                reading.source, reading.timestamp
            )));
        }

        let mut tables = self.tables.write();
        if !tables.sources.contains_key(&reading.source) {
            return Err(StorageError::NotFound(format!("source {}", reading.source)));
        }
        let series = tables.readings.entry(reading.source.clone()).or_default();
        if series.contains_key(&reading.timestamp) {
            return Err(StorageError::Conflict(format!(
                "reading for {} at {}",
                reading.source, reading.timestamp
            )));
        }
        series.insert(reading.timestamp, reading.clone());
        debug!(source = %reading.source, timestamp = %reading.timestamp, "stored reading");
        Ok(())
    }

    async fn delete_reading(&self, source: &str, timestamp: DateTime<Utc>) -> Result<(), StorageError> {
        self.tables
            .write()
            .readings
            .get_mut(source)
            .and_then(|series| series.remove(&timestamp))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("reading for {} at {}", source, timestamp)))
    }

    async fn delete_readings(&self, source: &str) -> Result<u64, StorageError> {
        let mut tables = self.tables.write();
        if !tables.sources.contains_key(source) {
            return Err(StorageError::NotFound(format!("source {}", source)));
        }
        let removed = tables.readings.remove(source).map(|r| r.len()).unwrap_or(0);
        Ok(removed as u64)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self.tables.read().users.get(username).cloned())
    }

    async fn get_users(&self) -> Result<Vec<User>, StorageError> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    async fn store_user(&self, user: &User, overwrite: bool) -> Result<(), StorageError> {
        let mut tables = self.tables.write();
        if !overwrite && tables.users.contains_key(&user.username) {
            return Err(StorageError::Conflict(format!("user {}", user.username)));
        }
        tables.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        self.tables
            .write()
            .users
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("user {}", username)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::POWER_GENERATED;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    async fn seeded() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.store_source(&Source::leaf("meter", "alice"), false)
            .await
            .unwrap();
        for minute in [0, 15, 30] {
            let reading = Reading::new("meter", t(minute), "test").with_property(POWER_GENERATED, minute);
            repo.store_reading(&reading).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_source_conflict_and_overwrite() {
        let repo = MemoryRepository::new();
        let source = Source::leaf("meter", "alice");
        repo.store_source(&source, false).await.unwrap();

        let err = repo.store_source(&source, false).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let updated = source.with_property("location", "roof");
        repo.store_source(&updated, true).await.unwrap();
        assert_eq!(repo.get_source("meter").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_invalid_source_rejected() {
        let repo = MemoryRepository::new();
        let mut leaf = Source::leaf("meter", "alice");
        leaf.subsources.push("other".to_string());

        let err = repo.store_source(&leaf, false).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_nearest_lookups() {
        let repo = seeded().await;

        let before = repo.reading_at_or_before("meter", t(20)).await.unwrap().unwrap();
        let after = repo.reading_at_or_after("meter", t(20)).await.unwrap().unwrap();
        assert_eq!(before.timestamp, t(15));
        assert_eq!(after.timestamp, t(30));

        let exact = repo.reading_at_or_before("meter", t(15)).await.unwrap().unwrap();
        assert_eq!(Some(exact), repo.get_reading("meter", t(15)).await.unwrap());
        assert!(repo.get_reading("meter", t(20)).await.unwrap().is_none());

        assert!(repo.reading_at_or_before("meter", t(-1)).await.unwrap().is_none());
        assert!(repo.reading_at_or_after("meter", t(31)).await.unwrap().is_none());
        assert_eq!(
            repo.latest_reading("meter").await.unwrap().unwrap().timestamp,
            t(30)
        );
    }

    #[tokio::test]
    async fn test_duplicate_reading_conflicts() {
        let repo = seeded().await;
        let dup = Reading::new("meter", t(15), "test");
        assert!(matches!(
            repo.store_reading(&dup).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reading_for_unknown_source_rejected() {
        let repo = MemoryRepository::new();
        let reading = Reading::new("ghost", t(0), "test");
        assert!(matches!(
            repo.store_reading(&reading).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_range_queries() {
        let repo = seeded().await;

        let index = repo.get_reading_index("meter", t(0), t(15)).await.unwrap();
        assert_eq!(index, vec![t(0), t(15)]);

        let readings = repo.get_readings("meter", t(10), t(60)).await.unwrap();
        assert_eq!(readings.len(), 2);

        assert!(matches!(
            repo.get_readings("meter", t(30), t(0)).await,
            Err(StorageError::BadInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_source_drops_readings() {
        let repo = seeded().await;
        repo.delete_source("meter").await.unwrap();

        assert!(repo.latest_reading("meter").await.unwrap().is_none());
        assert!(matches!(
            repo.delete_source("meter").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_readings() {
        let repo = seeded().await;
        repo.delete_reading("meter", t(0)).await.unwrap();
        assert!(repo.delete_reading("meter", t(0)).await.is_err());
        assert_eq!(repo.delete_readings("meter").await.unwrap(), 2);
        assert_eq!(repo.delete_readings("meter").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_users() {
        let repo = MemoryRepository::new();
        repo.store_user(&User::new("alice"), false).await.unwrap();
        assert!(repo.store_user(&User::new("alice"), false).await.is_err());
        assert_eq!(repo.get_users().await.unwrap().len(), 1);
        repo.delete_user("alice").await.unwrap();
        assert!(repo.get_user("alice").await.unwrap().is_none());
    }
}
