use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::properties::{Properties, PropertyError};

/// Tool name stamped on readings synthesized by the derivation engine.
pub const DERIVED_TOOL: &str = "open-energy-aggregator";

/// One timestamped sample of a source, keyed by `(source, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    #[serde(default)]
    pub properties: Properties,
    /// True only for readings computed here, never for stored samples.
    #[serde(default)]
    pub interpolated: bool,
}

impl Reading {
    pub fn new(source: impl Into<String>, timestamp: DateTime<Utc>, tool: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp,
            tool: tool.into(),
            properties: Properties::new(),
            interpolated: false,
        }
    }

    /// An empty synthesized reading.
    pub fn derived(source: impl Into<String>, timestamp: DateTime<Utc>, interpolated: bool) -> Self {
        Self {
            interpolated,
            ..Self::new(source, timestamp, DERIVED_TOOL)
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains(key)
    }

    pub fn value(&self, key: &str) -> Result<Option<f64>, PropertyError> {
        self.properties.get_f64(key)
    }

    pub fn is_derived(&self) -> bool {
        self.tool == DERIVED_TOOL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::properties::POWER_GENERATED;
    use chrono::TimeZone;

    #[test]
    fn test_derived_reading_is_marked() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let derived = Reading::derived("roof", ts, true).with_property(POWER_GENERATED, 42.0);

        assert!(derived.is_derived());
        assert!(derived.interpolated);
        assert_eq!(derived.value(POWER_GENERATED).unwrap(), Some(42.0));

        let raw = Reading::new("roof", ts, "modbus-poller");
        assert!(!raw.is_derived());
        assert!(!raw.interpolated);
    }
}
