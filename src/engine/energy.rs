//! Energy over an interval, by counter difference or by trapezoidal
//! integration of power.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use strum::Display;
use tracing::{debug, warn};

use super::power::power_values;
use super::straddle::{seconds_between, LeafStraddles, Straddle};
use super::DerivationError;
use crate::domain::{
    PropertyError, Reading, Source, ENERGY_CONSUMED, ENERGY_CONSUMED_TO_DATE, ENERGY_GENERATED,
    ENERGY_GENERATED_TO_DATE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EnergyMode {
    /// Difference of cumulative counters at the interval endpoints.
    Counter,
    /// Trapezoidal integration of sampled power.
    Integration,
}

impl EnergyMode {
    /// Counter mode only when every leaf declares counter support.
    pub fn for_leaves(leaves: &[Source]) -> Result<Self, PropertyError> {
        for leaf in leaves {
            if !leaf.supports_energy_counters()? {
                return Ok(Self::Integration);
            }
        }
        Ok(Self::Counter)
    }
}

/// Change of a cumulative counter between two instants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterDelta {
    Advanced(f64),
    /// The counter went down: register overflow or meter replacement.
    RolledOver { start: f64, end: f64 },
}

impl CounterDelta {
    pub fn between(start: f64, end: f64) -> Self {
        if end < start {
            Self::RolledOver { start, end }
        } else {
            Self::Advanced(end - start)
        }
    }

    /// Raw `end - start`; negative after a rollover.
    pub fn delta(&self) -> f64 {
        match *self {
            Self::Advanced(delta) => delta,
            Self::RolledOver { start, end } => end - start,
        }
    }

    pub fn is_rollover(&self) -> bool {
        matches!(self, Self::RolledOver { .. })
    }
}

/// Generated and consumed energy in watt-hours.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyTotals {
    pub generated: f64,
    pub consumed: f64,
    pub interpolated: bool,
}

impl EnergyTotals {
    fn absorb(&mut self, other: EnergyTotals) {
        self.generated += other.generated;
        self.consumed += other.consumed;
        self.interpolated |= other.interpolated;
    }

    pub fn into_reading(self, source: &str, timestamp: DateTime<Utc>) -> Reading {
        Reading::derived(source, timestamp, self.interpolated)
            .with_property(ENERGY_GENERATED, self.generated)
            .with_property(ENERGY_CONSUMED, self.consumed)
    }
}

/// Counter change for `key` between the targets of two straddles. A
/// counter carried at only one end of the interval is an error; carried at
/// neither end it has not moved.
pub fn counter_delta(start: &Straddle, end: &Straddle, key: &str) -> Result<CounterDelta, PropertyError> {
    match (start.carries(key), end.carries(key)) {
        (true, true) => {}
        (false, false) => return Ok(CounterDelta::Advanced(0.0)),
        _ => return Err(PropertyError::Missing(key.to_string())),
    }
    Ok(CounterDelta::between(
        start.interpolate_or_zero(key)?,
        end.interpolate_or_zero(key)?,
    ))
}

fn endpoints(leaf: &LeafStraddles) -> Result<(&Straddle, &Straddle), DerivationError> {
    match (leaf.straddles.first(), leaf.straddles.last()) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(DerivationError::EmptyInput),
    }
}

/// Sum of per-leaf counter deltas between the first and last straddle of
/// each list. A rollover is reported and its negative delta kept.
pub fn energy_from_counters(leaves: &[LeafStraddles]) -> Result<EnergyTotals, DerivationError> {
    if leaves.is_empty() {
        return Err(DerivationError::EmptyInput);
    }

    let mut totals = EnergyTotals::default();
    for leaf in leaves {
        let (start, end) = endpoints(leaf)?;
        let generated = counter_delta(start, end, ENERGY_GENERATED_TO_DATE)?;
        let consumed = counter_delta(start, end, ENERGY_CONSUMED_TO_DATE)?;

        for (key, delta) in [
            (ENERGY_GENERATED_TO_DATE, generated),
            (ENERGY_CONSUMED_TO_DATE, consumed),
        ] {
            if let CounterDelta::RolledOver { start: from, end: to } = delta {
                warn!(
                    source = %leaf.source.name,
                    counter = key,
                    from,
                    to,
                    "energy counter rolled over, delta is negative"
                );
            }
        }

        totals.absorb(EnergyTotals {
            generated: generated.delta(),
            consumed: consumed.delta(),
            interpolated: !start.is_degenerate() || !end.is_degenerate(),
        });
    }
    Ok(totals)
}

/// Trapezoidal energy of one leaf across its consecutive straddles.
pub fn integrate_leaf(leaf: &LeafStraddles) -> Result<EnergyTotals, DerivationError> {
    if leaf.straddles.is_empty() {
        return Err(DerivationError::EmptyInput);
    }

    let mut totals = EnergyTotals {
        interpolated: leaf.any_interpolated(),
        ..Default::default()
    };
    for (a, b) in leaf.straddles.iter().tuple_windows() {
        let hours = seconds_between(a.target(), b.target()) / 3600.0;
        let (gen_a, con_a) = power_values(a)?;
        let (gen_b, con_b) = power_values(b)?;
        totals.generated += (gen_a + gen_b) / 2.0 * hours;
        totals.consumed += (con_a + con_b) / 2.0 * hours;
    }
    debug!(
        source = %leaf.source.name,
        generated = totals.generated,
        consumed = totals.consumed,
        "integrated leaf energy"
    );
    Ok(totals)
}

pub fn energy_by_integration(leaves: &[LeafStraddles]) -> Result<EnergyTotals, DerivationError> {
    if leaves.is_empty() {
        return Err(DerivationError::EmptyInput);
    }

    let mut totals = EnergyTotals::default();
    for leaf in leaves {
        totals.absorb(integrate_leaf(leaf)?);
    }
    Ok(totals)
}
