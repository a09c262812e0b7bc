use super::straddle::Straddle;
use super::DerivationError;
use crate::domain::{Reading, POWER_CONSUMED, POWER_GENERATED};

/// Generated and consumed power at the straddle's target, in watts.
pub(crate) fn power_values(straddle: &Straddle) -> Result<(f64, f64), DerivationError> {
    Ok((
        straddle.interpolate_or_zero(POWER_GENERATED)?,
        straddle.interpolate_or_zero(POWER_CONSUMED)?,
    ))
}

/// Power of a single leaf at the straddle's target.
///
/// A degenerate straddle hands back the stored reading untouched so any
/// other properties it carries survive.
pub fn power_from_straddle(straddle: &Straddle) -> Result<Reading, DerivationError> {
    if straddle.is_degenerate() {
        return Ok(straddle.before().clone());
    }

    let (generated, consumed) = power_values(straddle)?;
    Ok(Reading::derived(straddle.source(), straddle.target(), true)
        .with_property(POWER_GENERATED, generated)
        .with_property(POWER_CONSUMED, consumed))
}

/// Summed power of several leaves at one shared instant, reported as `source`.
pub fn power_from_straddles(source: &str, straddles: &[Straddle]) -> Result<Reading, DerivationError> {
    let target = straddles.first().ok_or(DerivationError::EmptyInput)?.target();

    let mut generated = 0.0;
    let mut consumed = 0.0;
    let mut interpolated = false;
    for straddle in straddles {
        if straddle.target() != target {
            return Err(DerivationError::MixedInstants(target, straddle.target()));
        }
        let (g, c) = power_values(straddle)?;
        generated += g;
        consumed += c;
        interpolated |= !straddle.is_degenerate();
    }

    Ok(Reading::derived(source, target, interpolated)
        .with_property(POWER_GENERATED, generated)
        .with_property(POWER_CONSUMED, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::straddle::fixtures::{at, reading, straddle};

    fn flat(source: &str, watts: f64) -> Straddle {
        straddle(
            1800,
            reading(source, 0, &[(POWER_GENERATED, watts)]),
            reading(source, 3600, &[(POWER_GENERATED, watts)]),
        )
    }

    #[test]
    fn test_degenerate_returns_stored_reading() {
        let stored = reading("a", 0, &[(POWER_GENERATED, 12.0)]).with_property("voltage", 230.0);
        let result = power_from_straddle(&Straddle::exact(stored.clone())).unwrap();
        assert_eq!(result, stored);
        assert!(!result.interpolated);
    }

    #[test]
    fn test_interpolated_power() {
        let s = straddle(
            900,
            reading("a", 0, &[(POWER_GENERATED, 100.0), (POWER_CONSUMED, 40.0)]),
            reading("a", 3600, &[(POWER_GENERATED, 200.0), (POWER_CONSUMED, 0.0)]),
        );
        let result = power_from_straddle(&s).unwrap();

        assert!(result.interpolated);
        assert!(result.is_derived());
        assert_eq!(result.timestamp, at(900));
        assert_eq!(result.value(POWER_GENERATED).unwrap(), Some(125.0));
        assert_eq!(result.value(POWER_CONSUMED).unwrap(), Some(30.0));
    }

    #[test]
    fn test_two_leaves_sum() {
        let result = power_from_straddles("site", &[flat("a", 100.0), flat("b", 100.0)]).unwrap();
        assert_eq!(result.source, "site");
        assert_eq!(result.value(POWER_GENERATED).unwrap(), Some(200.0));
        assert_eq!(result.value(POWER_CONSUMED).unwrap(), Some(0.0));
        assert!(result.interpolated);
    }

    #[test]
    fn test_all_degenerate_is_not_interpolated() {
        let a = Straddle::exact(reading("a", 0, &[(POWER_GENERATED, 1.0)]));
        let b = Straddle::exact(reading("b", 0, &[(POWER_CONSUMED, 2.0)]));
        let result = power_from_straddles("site", &[a, b]).unwrap();
        assert!(!result.interpolated);
        assert_eq!(result.value(POWER_GENERATED).unwrap(), Some(1.0));
        assert_eq!(result.value(POWER_CONSUMED).unwrap(), Some(2.0));
    }

    #[test]
    fn test_one_non_degenerate_marks_interpolated() {
        let a = Straddle::exact(reading("a", 1800, &[(POWER_GENERATED, 100.0)]));
        let result = power_from_straddles("site", &[a, flat("b", 100.0)]).unwrap();
        assert!(result.interpolated);
        assert_eq!(result.value(POWER_GENERATED).unwrap(), Some(200.0));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            power_from_straddles("site", &[]),
            Err(DerivationError::EmptyInput)
        ));
    }

    #[test]
    fn test_mixed_instants_rejected() {
        let a = Straddle::exact(reading("a", 0, &[]));
        let b = Straddle::exact(reading("b", 60, &[]));
        assert!(matches!(
            power_from_straddles("site", &[a, b]),
            Err(DerivationError::MixedInstants(_, _))
        ));
    }
}
