use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::properties::{
    Properties, PropertyError, CARBON_INTENSITY, POLLING_INTERVAL, SUPPORTS_ENERGY_COUNTERS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source name must not be empty")]
    EmptyName,
    #[error("non-virtual source '{0}' cannot have subsources")]
    LeafWithChildren(String),
    #[error("virtual source '{0}' lists itself as a subsource")]
    SelfReference(String),
}

/// A meter, either a leaf with stored readings or a virtual aggregate of
/// other sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Child source names in declaration order.
    #[serde(default)]
    pub subsources: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Source {
    pub fn leaf(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            public: false,
            is_virtual: false,
            location: None,
            coordinates: None,
            description: None,
            subsources: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn composite<I, S>(name: impl Into<String>, owner: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_virtual: true,
            subsources: children.into_iter().map(Into::into).collect(),
            ..Self::leaf(name, owner)
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.name.trim().is_empty() {
            return Err(SourceError::EmptyName);
        }
        if !self.is_virtual && !self.subsources.is_empty() {
            return Err(SourceError::LeafWithChildren(self.name.clone()));
        }
        if self.subsources.iter().any(|child| *child == self.name) {
            return Err(SourceError::SelfReference(self.name.clone()));
        }
        Ok(())
    }

    /// Carbon intensity in lbs CO2/MWh, when present, parseable and non-negative.
    pub fn carbon_intensity(&self) -> Option<f64> {
        self.properties
            .get_f64(CARBON_INTENSITY)
            .ok()
            .flatten()
            .filter(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn supports_carbon(&self) -> bool {
        self.carbon_intensity().is_some()
    }

    pub fn supports_energy_counters(&self) -> Result<bool, PropertyError> {
        Ok(self
            .properties
            .get_bool(SUPPORTS_ENERGY_COUNTERS)?
            .unwrap_or(false))
    }

    /// Suggested polling interval in seconds.
    pub fn polling_interval(&self) -> Result<Option<u64>, PropertyError> {
        self.properties
            .get(POLLING_INTERVAL)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| PropertyError::Unparseable {
                    key: POLLING_INTERVAL.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()
    }
}
