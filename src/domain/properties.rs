use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Instantaneous power produced, in watts.
pub const POWER_GENERATED: &str = "powerGenerated";
/// Instantaneous power drawn, in watts.
pub const POWER_CONSUMED: &str = "powerConsumed";
/// Cumulative energy counter for generation, in watt-hours.
pub const ENERGY_GENERATED_TO_DATE: &str = "energyGeneratedToDate";
/// Cumulative energy counter for consumption, in watt-hours.
pub const ENERGY_CONSUMED_TO_DATE: &str = "energyConsumedToDate";
/// Energy produced over an interval, in watt-hours.
pub const ENERGY_GENERATED: &str = "energyGenerated";
/// Energy drawn over an interval, in watt-hours.
pub const ENERGY_CONSUMED: &str = "energyConsumed";
/// Carbon emitted by generation over an interval, in lbs CO2.
pub const CARBON_GENERATED: &str = "carbonGenerated";
/// Carbon attributable to consumption over an interval, in lbs CO2.
pub const CARBON_CONSUMED: &str = "carbonConsumed";

/// Source property: lbs CO2 equivalent per MWh.
pub const CARBON_INTENSITY: &str = "carbonIntensity";
/// Source property: "true" when the meter keeps cumulative energy counters.
pub const SUPPORTS_ENERGY_COUNTERS: &str = "supportsEnergyCounters";
/// Source property: suggested polling interval in seconds.
pub const POLLING_INTERVAL: &str = "pollingInterval";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("property '{0}' is missing")]
    Missing(String),
    #[error("property '{key}' has unparseable value '{value}'")]
    Unparseable { key: String, value: String },
}

/// String-keyed property bag shared by sources, readings and users.
///
/// Values are kept as strings; the typed accessors parse on demand and
/// report unparseable values instead of guessing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0.insert(key.into(), value.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Numeric value of `key`, `None` when absent.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, PropertyError> {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| PropertyError::Unparseable {
                        key: key.to_string(),
                        value: raw.to_string(),
                    })
            })
            .transpose()
    }

    /// Numeric value of `key`, failing when absent.
    pub fn require_f64(&self, key: &str) -> Result<f64, PropertyError> {
        self.get_f64(key)?
            .ok_or_else(|| PropertyError::Missing(key.to_string()))
    }

    /// Boolean value of `key` ("true"/"false", any case), `None` when absent.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, PropertyError> {
        self.get(key)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(PropertyError::Unparseable {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
            })
            .transpose()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}
