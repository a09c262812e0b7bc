use chrono::{DateTime, Utc};
use tracing::debug;

use super::energy::integrate_leaf;
use super::straddle::LeafStraddles;
use super::DerivationError;
use crate::domain::{Reading, CARBON_CONSUMED, CARBON_GENERATED};

/// Watt-hours per megawatt-hour.
const WH_PER_MWH: f64 = 1_000_000.0;

/// Carbon in lbs CO2 attributed to generated and consumed energy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarbonTotals {
    pub generated: f64,
    pub consumed: f64,
}

impl CarbonTotals {
    /// Carbon is never a stored value, so the result is always interpolated.
    pub fn into_reading(self, source: &str, timestamp: DateTime<Utc>) -> Reading {
        Reading::derived(source, timestamp, true)
            .with_property(CARBON_GENERATED, self.generated)
            .with_property(CARBON_CONSUMED, self.consumed)
    }
}

/// Carbon of one leaf at its own intensity. Leaves without a usable
/// intensity contribute nothing.
pub fn carbon_from_straddles(leaf: &LeafStraddles) -> Result<CarbonTotals, DerivationError> {
    let Some(intensity) = leaf.source.carbon_intensity() else {
        debug!(source = %leaf.source.name, "no carbon intensity, contributes zero");
        return Ok(CarbonTotals::default());
    };

    let energy = integrate_leaf(leaf)?;
    Ok(CarbonTotals {
        generated: energy.generated * intensity / WH_PER_MWH,
        consumed: energy.consumed * intensity / WH_PER_MWH,
    })
}

pub fn carbon_from_leaf_lists(leaves: &[LeafStraddles]) -> Result<CarbonTotals, DerivationError> {
    if leaves.is_empty() {
        return Err(DerivationError::EmptyInput);
    }

    let mut totals = CarbonTotals::default();
    for leaf in leaves {
        let carbon = carbon_from_straddles(leaf)?;
        totals.generated += carbon.generated;
        totals.consumed += carbon.consumed;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Source, CARBON_INTENSITY, POWER_CONSUMED, POWER_GENERATED};
    use crate::engine::straddle::fixtures::{at, reading};
    use crate::engine::straddle::Straddle;

    fn flat_hour(source: Source, key: &str, watts: f64) -> LeafStraddles {
        let name = source.name.clone();
        LeafStraddles {
            source,
            straddles: vec![
                Straddle::exact(reading(&name, 0, &[(key, watts)])),
                Straddle::exact(reading(&name, 3600, &[(key, watts)])),
            ],
        }
    }

    #[test]
    fn test_flat_hour_at_1000_lbs_per_mwh() {
        let plant = Source::leaf("plant", "alice").with_property(CARBON_INTENSITY, 1000);
        let carbon = carbon_from_straddles(&flat_hour(plant, POWER_GENERATED, 100.0)).unwrap();
        assert!((carbon.generated - 0.1).abs() < 1e-12);
        assert_eq!(carbon.consumed, 0.0);
    }

    #[test]
    fn test_each_leaf_uses_its_own_intensity() {
        let dirty = Source::leaf("dirty", "alice").with_property(CARBON_INTENSITY, 2000);
        let clean = Source::leaf("clean", "alice").with_property(CARBON_INTENSITY, 0);
        let unknown = Source::leaf("unknown", "alice");

        let totals = carbon_from_leaf_lists(&[
            flat_hour(dirty, POWER_CONSUMED, 500.0),
            flat_hour(clean, POWER_CONSUMED, 500.0),
            flat_hour(unknown, POWER_CONSUMED, 500.0),
        ])
        .unwrap();
        assert!((totals.consumed - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reading_is_always_interpolated() {
        let r = CarbonTotals {
            generated: 0.1,
            consumed: 0.0,
        }
        .into_reading("plant", at(0));
        assert!(r.interpolated);
        assert_eq!(r.value(CARBON_GENERATED).unwrap(), Some(0.1));
        assert_eq!(r.timestamp, at(0));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            carbon_from_leaf_lists(&[]),
            Err(DerivationError::EmptyInput)
        ));
    }
}
