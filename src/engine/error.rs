use chrono::{DateTime, Utc};
use thiserror::Error;

use super::straddle::StraddleError;
use crate::domain::PropertyError;
use crate::repo::StorageError;

/// Outcomes of a derivation that did not produce a reading.
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("no readings for {name} around {at}")]
    NoData { name: String, at: DateTime<Utc> },

    #[error("{0} has no readings")]
    NoReadings(String),

    #[error("bad interval: start {start} is after end {end}")]
    BadInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("bad sampling interval: {minutes} minutes over a {span_minutes}-minute range")]
    BadSamplingInterval { minutes: i64, span_minutes: i64 },

    #[error("{name} has no bracketing readings for {at}")]
    IncompleteCoverage { name: String, at: DateTime<Utc> },

    #[error("cycle in virtual source graph: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("no descendant of {0} declares a carbon intensity")]
    CarbonUnsupported(String),

    #[error("nothing to aggregate")]
    EmptyInput,

    #[error("straddles target different instants: {0} and {1}")]
    MixedInstants(DateTime<Utc>, DateTime<Utc>),

    #[error(transparent)]
    Straddle(#[from] StraddleError),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DerivationError {
    /// Whether this outcome means "no result" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DerivationError::UnknownSource(_)
                | DerivationError::NoData { .. }
                | DerivationError::NoReadings(_)
                | DerivationError::IncompleteCoverage { .. }
                | DerivationError::Storage(StorageError::NotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_not_found_classification() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(DerivationError::UnknownSource("x".into()).is_not_found());
        assert!(DerivationError::NoData { name: "x".into(), at }.is_not_found());
        assert!(!DerivationError::BadInterval { start: at, end: at }.is_not_found());
        assert!(!DerivationError::EmptyInput.is_not_found());
    }

    #[test]
    fn test_cycle_display() {
        let err = DerivationError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cycle in virtual source graph: a -> b -> a");
    }
}
