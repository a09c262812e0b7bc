use anyhow::{anyhow, Result};
use chrono::Duration;
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Tuning for the derivation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Widest gap between the two readings of a straddle that still counts
    /// as data. Unset means unbounded.
    #[serde(default)]
    pub max_straddle_gap_minutes: Option<u64>,
    /// Sampling step for energy/carbon requests that do not specify one.
    #[serde(default)]
    pub default_sampling_minutes: Option<i64>,
    /// Most sampling instants a single energy or carbon request may use.
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_max_samples() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_straddle_gap_minutes: None,
            default_sampling_minutes: None,
            max_samples: default_max_samples(),
        }
    }
}

impl EngineConfig {
    pub fn max_gap(&self) -> Result<Option<Duration>> {
        self.max_straddle_gap_minutes
            .map(|m| {
                i64::try_from(m)
                    .ok()
                    .and_then(Duration::try_minutes)
                    .ok_or_else(|| anyhow!("engine.max_straddle_gap_minutes = {m} is out of range"))
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        self.max_gap()?;
        if self.max_samples < 2 {
            return Err(anyhow!("engine.max_samples must be at least 2, got {}", self.max_samples));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::figment("config/default.toml")
    }

    fn figment(path: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("OEA__").split("__"));
        let cfg: Self = figment.extract()?;
        cfg.engine.validate()?;
        Ok(cfg)
    }
}
