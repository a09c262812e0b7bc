use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use tracing::debug;

use super::straddle::{LeafStraddles, Straddle};
use super::virtual_source::resolve_leaves;
use super::DerivationError;
use crate::domain::Source;
use crate::repo::Repository;

/// Builds straddles for leaf sources from the nearest stored readings.
pub struct StraddleBuilder<'a> {
    repo: &'a dyn Repository,
    max_gap: Option<Duration>,
}

impl<'a> StraddleBuilder<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo, max_gap: None }
    }

    /// Treat straddles whose readings are further apart than `gap` as missing.
    pub fn with_max_gap(mut self, gap: Option<Duration>) -> Self {
        self.max_gap = gap;
        self
    }

    /// Straddle of `leaf` around `instant`, `None` when either side has no reading.
    pub async fn straddle(
        &self,
        leaf: &Source,
        instant: DateTime<Utc>,
    ) -> Result<Option<Straddle>, DerivationError> {
        let Some(before) = self.repo.reading_at_or_before(&leaf.name, instant).await? else {
            debug!(source = %leaf.name, %instant, "no reading at or before instant");
            return Ok(None);
        };
        if before.timestamp == instant {
            return Ok(Some(Straddle::exact(before)));
        }

        let Some(after) = self.repo.reading_at_or_after(&leaf.name, instant).await? else {
            debug!(source = %leaf.name, %instant, "no reading at or after instant");
            return Ok(None);
        };

        if let Some(max_gap) = self.max_gap {
            if after.timestamp - before.timestamp > max_gap {
                debug!(
                    source = %leaf.name,
                    before = %before.timestamp,
                    after = %after.timestamp,
                    "readings too far apart to straddle"
                );
                return Ok(None);
            }
        }

        Ok(Some(Straddle::new(instant, before, after)?))
    }

    /// One straddle per leaf of `source` at `instant`. Leaves without data are
    /// left out.
    pub async fn straddle_list(
        &self,
        source: &Source,
        instant: DateTime<Utc>,
    ) -> Result<Vec<Straddle>, DerivationError> {
        let leaves = resolve_leaves(self.repo, source).await?;
        let found = try_join_all(leaves.iter().map(|leaf| self.straddle(leaf, instant))).await?;

        let straddles: Vec<Straddle> = found.into_iter().flatten().collect();
        if straddles.len() < leaves.len() {
            debug!(
                source = %source.name,
                %instant,
                covered = straddles.len(),
                leaves = leaves.len(),
                "partial coverage"
            );
        }
        Ok(straddles)
    }

    /// Straddles of `leaf` at every instant, in order. A missing straddle
    /// fails the whole request.
    pub async fn leaf_straddles(
        &self,
        leaf: &Source,
        instants: &[DateTime<Utc>],
    ) -> Result<LeafStraddles, DerivationError> {
        let mut straddles = Vec::with_capacity(instants.len());
        for &instant in instants {
            let straddle = self.straddle(leaf, instant).await?.ok_or_else(|| {
                DerivationError::IncompleteCoverage {
                    name: leaf.name.clone(),
                    at: instant,
                }
            })?;
            straddles.push(straddle);
        }
        Ok(LeafStraddles {
            source: leaf.clone(),
            straddles,
        })
    }

    /// Per-leaf straddle lists for every leaf of `source`.
    pub async fn straddle_lists(
        &self,
        source: &Source,
        instants: &[DateTime<Utc>],
    ) -> Result<Vec<LeafStraddles>, DerivationError> {
        let leaves = resolve_leaves(self.repo, source).await?;
        self.straddle_lists_for(&leaves, instants).await
    }

    pub async fn straddle_lists_for(
        &self,
        leaves: &[Source],
        instants: &[DateTime<Utc>],
    ) -> Result<Vec<LeafStraddles>, DerivationError> {
        try_join_all(leaves.iter().map(|leaf| self.leaf_straddles(leaf, instants))).await
    }
}
