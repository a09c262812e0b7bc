//! Bracketing pairs of readings and linear interpolation between them.
//!
//! A [`Straddle`] holds the reading at-or-before and the reading at-or-after
//! a target instant for one leaf source. When the target matches a stored
//! reading exactly both sides are that reading and the straddle is
//! *degenerate*; interpolation then returns stored values unchanged.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{PropertyError, Reading, Source};

/// A straddle that could not be built. Any of these means the storage
/// engine broke its nearest-reading contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StraddleError {
    #[error("reading at {before} comes after reading at {after}")]
    OutOfOrder {
        before: DateTime<Utc>,
        after: DateTime<Utc>,
    },
    #[error("target {target} lies outside [{before}, {after}]")]
    TargetOutsideRange {
        target: DateTime<Utc>,
        before: DateTime<Utc>,
        after: DateTime<Utc>,
    },
    #[error("readings belong to different sources: {0} and {1}")]
    MixedSources(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Straddle {
    target: DateTime<Utc>,
    before: Reading,
    after: Reading,
}

impl Straddle {
    pub fn new(target: DateTime<Utc>, before: Reading, after: Reading) -> Result<Self, StraddleError> {
        if before.source != after.source {
            return Err(StraddleError::MixedSources(before.source, after.source));
        }
        if before.timestamp > after.timestamp {
            return Err(StraddleError::OutOfOrder {
                before: before.timestamp,
                after: after.timestamp,
            });
        }
        if target < before.timestamp || target > after.timestamp {
            return Err(StraddleError::TargetOutsideRange {
                target,
                before: before.timestamp,
                after: after.timestamp,
            });
        }
        Ok(Self { target, before, after })
    }

    /// Degenerate straddle on a reading whose timestamp is the target.
    pub fn exact(reading: Reading) -> Self {
        Self {
            target: reading.timestamp,
            before: reading.clone(),
            after: reading,
        }
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn before(&self) -> &Reading {
        &self.before
    }

    pub fn after(&self) -> &Reading {
        &self.after
    }

    pub fn source(&self) -> &str {
        &self.before.source
    }

    pub fn is_degenerate(&self) -> bool {
        self.before.timestamp == self.after.timestamp
    }

    /// Seconds between the two readings.
    pub fn span_seconds(&self) -> f64 {
        seconds_between(self.before.timestamp, self.after.timestamp)
    }

    /// Value of `key` at the target instant.
    ///
    /// Degenerate: the stored value, failing when absent. Otherwise a
    /// property missing on either side interpolates to 0.
    pub fn interpolate(&self, key: &str) -> Result<f64, PropertyError> {
        if self.is_degenerate() {
            return self.before.properties.require_f64(key);
        }

        let (Some(v0), Some(v1)) = (self.before.value(key)?, self.after.value(key)?) else {
            return Ok(0.0);
        };

        let elapsed = seconds_between(self.before.timestamp, self.target);
        Ok(v0 + (v1 - v0) * elapsed / self.span_seconds())
    }

    /// Whether both readings carry `key`.
    pub fn carries(&self, key: &str) -> bool {
        self.before.has_property(key) && self.after.has_property(key)
    }

    /// Like [`Straddle::interpolate`], but a property the degenerate reading
    /// does not carry counts as 0 instead of failing.
    pub fn interpolate_or_zero(&self, key: &str) -> Result<f64, PropertyError> {
        if self.is_degenerate() && !self.before.has_property(key) {
            return Ok(0.0);
        }
        self.interpolate(key)
    }
}

/// Per-leaf straddles, one per requested instant, in request order.
#[derive(Debug, Clone)]
pub struct LeafStraddles {
    pub source: Source,
    pub straddles: Vec<Straddle>,
}

impl LeafStraddles {
    pub fn any_interpolated(&self) -> bool {
        self.straddles.iter().any(|s| !s.is_degenerate())
    }
}

pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
