#![cfg(feature = "db")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::{debug, info};

use super::{check_interval, Repository, StorageError};
use crate::domain::{Properties, Reading, Source, User};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        name        TEXT PRIMARY KEY,
        owner       TEXT NOT NULL,
        public      BOOLEAN NOT NULL DEFAULT FALSE,
        is_virtual  BOOLEAN NOT NULL DEFAULT FALSE,
        location    TEXT,
        coordinates TEXT,
        description TEXT,
        subsources  JSONB NOT NULL DEFAULT '[]',
        properties  JSONB NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS readings (
        source      TEXT NOT NULL REFERENCES sources(name) ON DELETE CASCADE,
        ts          TIMESTAMPTZ NOT NULL,
        tool        TEXT NOT NULL,
        properties  JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (source, ts)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        username    TEXT PRIMARY KEY,
        admin       BOOLEAN NOT NULL DEFAULT FALSE,
        properties  JSONB NOT NULL DEFAULT '{}'
    )
    "#,
];

const SOURCE_COLUMNS: &str =
    "name, owner, public, is_virtual, location, coordinates, description, subsources, properties";
const READING_COLUMNS: &str = "source, ts, tool, properties";

#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    name: String,
    owner: String,
    public: bool,
    is_virtual: bool,
    location: Option<String>,
    coordinates: Option<String>,
    description: Option<String>,
    subsources: Json<Vec<String>>,
    properties: Json<Properties>,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            name: row.name,
            owner: row.owner,
            public: row.public,
            is_virtual: row.is_virtual,
            location: row.location,
            coordinates: row.coordinates,
            description: row.description,
            subsources: row.subsources.0,
            properties: row.properties.0,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    source: String,
    ts: DateTime<Utc>,
    tool: String,
    properties: Json<Properties>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Reading {
            source: row.source,
            timestamp: row.ts,
            tool: row.tool,
            properties: row.properties.0,
            interpolated: false,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    username: String,
    admin: bool,
    properties: Json<Properties>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            username: row.username,
            admin: row.admin,
            properties: row.properties.0,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::Conflict(db_err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StorageError::NotFound(db_err.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Postgres storage engine.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("Failed to create database pool")?;
        Ok(Self { pool })
    }

    /// Create the tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        info!("database schema ready");
        Ok(())
    }

    async fn nearest(
        &self,
        source: &str,
        at: DateTime<Utc>,
        before: bool,
    ) -> Result<Option<Reading>, StorageError> {
        let sql = if before {
            format!("SELECT {READING_COLUMNS} FROM readings WHERE source = $1 AND ts <= $2 ORDER BY ts DESC LIMIT 1")
        } else {
            format!("SELECT {READING_COLUMNS} FROM readings WHERE source = $1 AND ts >= $2 ORDER BY ts ASC LIMIT 1")
        };
        let row = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(source)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_source(&self, name: &str) -> Result<Option<Source>, StorageError> {
        let row = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_sources(&self) -> Result<Vec<Source>, StorageError> {
        let rows = sqlx::query_as::<_, SourceRow>(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_source_index(&self) -> Result<Vec<String>, StorageError> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM sources ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn store_source(&self, source: &Source, overwrite: bool) -> Result<(), StorageError> {
        source
            .validate()
            .map_err(|e| StorageError::Invalid(e.to_string()))?;

        let on_conflict = if overwrite {
            "ON CONFLICT (name) DO UPDATE SET owner = EXCLUDED.owner, public = EXCLUDED.public, \
             is_virtual = EXCLUDED.is_virtual, location = EXCLUDED.location, \
             coordinates = EXCLUDED.coordinates, description = EXCLUDED.description, \
             subsources = EXCLUDED.subsources, properties = EXCLUDED.properties"
        } else {
            "ON CONFLICT (name) DO NOTHING"
        };
        let result = sqlx::query(&format!(
            "INSERT INTO sources ({SOURCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) {on_conflict}"
        ))
        .bind(&source.name)
        .bind(&source.owner)
        .bind(source.public)
        .bind(source.is_virtual)
        .bind(&source.location)
        .bind(&source.coordinates)
        .bind(&source.description)
        .bind(Json(&source.subsources))
        .bind(Json(&source.properties))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!("source {}", source.name)));
        }
        info!(source = %source.name, virtual_source = source.is_virtual, "stored source");
        Ok(())
    }

    async fn delete_source(&self, name: &str) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM sources WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("source {}", name)));
        }
        info!(source = %name, "deleted source");
        Ok(())
    }

    async fn get_reading(
        &self,
        source: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        let row = sqlx::query_as::<_, ReadingRow>(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE source = $1 AND ts = $2"
        ))
        .bind(source)
        .bind(timestamp)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn reading_at_or_before(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        self.nearest(source, at, true).await
    }

    async fn reading_at_or_after(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Reading>, StorageError> {
        self.nearest(source, at, false).await
    }

    async fn latest_reading(&self, source: &str) -> Result<Option<Reading>, StorageError> {
        let row = sqlx::query_as::<_, ReadingRow>(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE source = $1 ORDER BY ts DESC LIMIT 1"
        ))
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_reading_index(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        check_interval(start, end)?;
        let stamps = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT ts FROM readings WHERE source = $1 AND ts >= $2 AND ts <= $3 ORDER BY ts ASC",
        )
        .bind(source)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(stamps)
    }

    async fn get_readings(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StorageError> {
        check_interval(start, end)?;
        let rows = sqlx::query_as::<_, ReadingRow>(&format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE source = $1 AND ts >= $2 AND ts <= $3 ORDER BY ts ASC"
        ))
        .bind(source)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn store_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        if reading.interpolated {
            return Err(StorageError::Invalid(format!(
                "reading for {} at {} is interpolated",
                reading.source, reading.timestamp
            )));
        }
        sqlx::query(&format!(
            "INSERT INTO readings ({READING_COLUMNS}) VALUES ($1, $2, $3, $4)"
        ))
        .bind(&reading.source)
        .bind(reading.timestamp)
        .bind(&reading.tool)
        .bind(Json(&reading.properties))
        .execute(&self.pool)
        .await?;
        debug!(source = %reading.source, timestamp = %reading.timestamp, "stored reading");
        Ok(())
    }

    async fn delete_reading(&self, source: &str, timestamp: DateTime<Utc>) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM readings WHERE source = $1 AND ts = $2")
            .bind(source)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "reading for {} at {}",
                source, timestamp
            )));
        }
        Ok(())
    }

    async fn delete_readings(&self, source: &str) -> Result<u64, StorageError> {
        if self.get_source(source).await?.is_none() {
            return Err(StorageError::NotFound(format!("source {}", source)));
        }
        let result = sqlx::query("DELETE FROM readings WHERE source = $1")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT username, admin, properties FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_users(&self) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT username, admin, properties FROM users ORDER BY username ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn store_user(&self, user: &User, overwrite: bool) -> Result<(), StorageError> {
        let on_conflict = if overwrite {
            "ON CONFLICT (username) DO UPDATE SET admin = EXCLUDED.admin, properties = EXCLUDED.properties"
        } else {
            "ON CONFLICT (username) DO NOTHING"
        };
        let result = sqlx::query(&format!(
            "INSERT INTO users (username, admin, properties) VALUES ($1, $2, $3) {on_conflict}"
        ))
        .bind(&user.username)
        .bind(user.admin)
        .bind(Json(&user.properties))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!("user {}", user.username)));
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user {}", username)));
        }
        Ok(())
    }
}
