use chrono::{DateTime, Duration, Utc};

use super::DerivationError;

pub fn check_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), DerivationError> {
    if start > end {
        return Err(DerivationError::BadInterval { start, end });
    }
    Ok(())
}

/// Instants from `start` to `end` spaced `step_minutes` apart. The last
/// instant is always `end`, so the final step may be shorter. Without a
/// step only the two endpoints are sampled. Steps that would yield more
/// than `max_samples` instants are rejected.
pub fn sample_instants(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_minutes: Option<i64>,
    max_samples: usize,
) -> Result<Vec<DateTime<Utc>>, DerivationError> {
    check_interval(start, end)?;

    let Some(minutes) = step_minutes else {
        return Ok(vec![start, end]);
    };

    let span_minutes = (end - start).num_minutes();
    let bad_step = || DerivationError::BadSamplingInterval {
        minutes,
        span_minutes,
    };
    if minutes <= 0 || minutes > span_minutes {
        return Err(bad_step());
    }

    let step_seconds = minutes * 60;
    let steps = ((end - start).num_seconds() + step_seconds - 1) / step_seconds;
    let count = usize::try_from(steps + 1)
        .ok()
        .filter(|&count| count <= max_samples)
        .ok_or_else(bad_step)?;

    let step = Duration::try_minutes(minutes).ok_or_else(bad_step)?;
    let mut instants = Vec::with_capacity(count);
    let mut t = start;
    while t < end {
        instants.push(t);
        match t.checked_add_signed(step) {
            Some(next) => t = next,
            None => break,
        }
    }
    instants.push(end);
    Ok(instants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::straddle::fixtures::at;
    use chrono::TimeZone;
    use rstest::rstest;

    const MAX: usize = 10_000;

    #[test]
    fn test_endpoints_without_step() {
        assert_eq!(sample_instants(at(0), at(3600), None, MAX).unwrap(), vec![at(0), at(3600)]);
    }

    #[test]
    fn test_even_steps() {
        let instants = sample_instants(at(0), at(3600), Some(15), MAX).unwrap();
        assert_eq!(instants, vec![at(0), at(900), at(1800), at(2700), at(3600)]);
    }

    #[test]
    fn test_uneven_last_step() {
        let instants = sample_instants(at(0), at(3000), Some(20), MAX).unwrap();
        assert_eq!(instants, vec![at(0), at(1200), at(2400), at(3000)]);
    }

    #[test]
    fn test_start_after_end() {
        assert!(matches!(
            sample_instants(at(10), at(0), None, MAX),
            Err(DerivationError::BadInterval { .. })
        ));
    }

    #[rstest]
    #[case(0)]
    #[case(-5)]
    #[case(61)]
    fn test_bad_sampling_interval(#[case] minutes: i64) {
        assert!(matches!(
            sample_instants(at(0), at(3600), Some(minutes), MAX),
            Err(DerivationError::BadSamplingInterval { .. })
        ));
    }

    #[rstest]
    #[case(1, 61, true)]
    #[case(1, 60, false)]
    #[case(15, 5, true)]
    #[case(15, 4, false)]
    fn test_sample_limit(#[case] minutes: i64, #[case] max_samples: usize, #[case] accepted: bool) {
        let result = sample_instants(at(0), at(3600), Some(minutes), max_samples);
        if accepted {
            assert_eq!(result.unwrap().len(), max_samples);
        } else {
            assert!(matches!(result, Err(DerivationError::BadSamplingInterval { .. })));
        }
    }

    #[test]
    fn test_huge_span_at_fine_step_is_rejected() {
        let start = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(9000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            sample_instants(start, end, Some(1), MAX),
            Err(DerivationError::BadSamplingInterval { minutes: 1, .. })
        ));
    }
}
