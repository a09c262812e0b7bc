//! Derivation of power, energy, carbon and latest readings from stored
//! samples, for leaf and virtual sources alike.

pub mod builder;
pub mod carbon;
pub mod energy;
pub mod error;
pub mod power;
pub mod sampling;
pub mod straddle;
pub mod virtual_source;

pub use builder::StraddleBuilder;
pub use carbon::CarbonTotals;
pub use energy::{CounterDelta, EnergyMode, EnergyTotals};
pub use error::DerivationError;
pub use straddle::{LeafStraddles, Straddle, StraddleError};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::domain::{Reading, Source};
use crate::repo::Repository;

/// Entry point for the consumer operations: power at an instant, energy and
/// carbon over an interval, and latest reading.
#[derive(Clone)]
pub struct DerivationEngine {
    repo: Arc<dyn Repository>,
    max_gap: Option<Duration>,
    max_samples: usize,
}

impl DerivationEngine {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            max_gap: None,
            max_samples: EngineConfig::default().max_samples,
        }
    }

    pub fn from_config(repo: Arc<dyn Repository>, cfg: &EngineConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        Ok(Self {
            repo,
            max_gap: cfg.max_gap()?,
            max_samples: cfg.max_samples,
        })
    }

    fn builder(&self) -> StraddleBuilder<'_> {
        StraddleBuilder::new(self.repo.as_ref()).with_max_gap(self.max_gap)
    }

    async fn source(&self, name: &str) -> Result<Source, DerivationError> {
        self.repo
            .get_source(name)
            .await?
            .ok_or_else(|| DerivationError::UnknownSource(name.to_string()))
    }

    /// Leaves of `name`; a source without leaves has no data.
    async fn leaves(&self, name: &str, at: DateTime<Utc>) -> Result<Vec<Source>, DerivationError> {
        let source = self.source(name).await?;
        let leaves = virtual_source::resolve_leaves(self.repo.as_ref(), &source).await?;
        if leaves.is_empty() {
            return Err(DerivationError::NoData {
                name: name.to_string(),
                at,
            });
        }
        Ok(leaves)
    }

    pub async fn descendants(&self, name: &str) -> Result<Vec<Source>, DerivationError> {
        virtual_source::descendants(self.repo.as_ref(), name).await
    }

    /// Power at `instant`. Leaves of a virtual source without data around
    /// the instant are left out of the sum.
    pub async fn power(&self, name: &str, instant: DateTime<Utc>) -> Result<Reading, DerivationError> {
        let source = self.source(name).await?;
        let no_data = || DerivationError::NoData {
            name: name.to_string(),
            at: instant,
        };

        if !source.is_virtual {
            let straddle = self.builder().straddle(&source, instant).await?.ok_or_else(no_data)?;
            return power::power_from_straddle(&straddle);
        }

        let straddles = self.builder().straddle_list(&source, instant).await?;
        if straddles.is_empty() {
            return Err(no_data());
        }
        power::power_from_straddles(name, &straddles)
    }

    /// Energy between `start` and `end`, sampling power every
    /// `sampling_minutes` when integrating. Every leaf needs data at every
    /// instant used.
    pub async fn energy(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sampling_minutes: Option<i64>,
    ) -> Result<Reading, DerivationError> {
        let instants = sampling::sample_instants(start, end, sampling_minutes, self.max_samples)?;
        let leaves = self.leaves(name, start).await?;

        let mode = EnergyMode::for_leaves(&leaves)?;
        let totals = match mode {
            EnergyMode::Counter => {
                let lists = self.builder().straddle_lists_for(&leaves, &[start, end]).await?;
                energy::energy_from_counters(&lists)?
            }
            EnergyMode::Integration => {
                let lists = self.builder().straddle_lists_for(&leaves, &instants).await?;
                energy::energy_by_integration(&lists)?
            }
        };

        info!(
            source = name,
            %mode,
            leaves = leaves.len(),
            generated = totals.generated,
            consumed = totals.consumed,
            "energy derived"
        );
        Ok(totals.into_reading(name, start))
    }

    /// Carbon between `start` and `end`, each leaf weighted by its own
    /// carbon intensity.
    pub async fn carbon(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sampling_minutes: Option<i64>,
    ) -> Result<Reading, DerivationError> {
        let instants = sampling::sample_instants(start, end, sampling_minutes, self.max_samples)?;
        let leaves = self.leaves(name, start).await?;

        let carbon_leaves: Vec<Source> = leaves.into_iter().filter(Source::supports_carbon).collect();
        if carbon_leaves.is_empty() {
            return Err(DerivationError::CarbonUnsupported(name.to_string()));
        }

        let lists = self.builder().straddle_lists_for(&carbon_leaves, &instants).await?;
        let totals = carbon::carbon_from_leaf_lists(&lists)?;
        debug!(source = name, leaves = carbon_leaves.len(), "carbon derived");
        Ok(totals.into_reading(name, start))
    }

    pub async fn latest(&self, name: &str) -> Result<Reading, DerivationError> {
        let source = self.source(name).await?;
        virtual_source::latest(self.repo.as_ref(), &source)
            .await?
            .ok_or_else(|| DerivationError::NoReadings(name.to_string()))
    }

    /// Whether `name`, or any leaf beneath it, declares a carbon intensity.
    pub async fn supports_carbon(&self, name: &str) -> Result<bool, DerivationError> {
        let leaves = self.descendants(name).await?;
        Ok(leaves.iter().any(Source::supports_carbon))
    }
}
