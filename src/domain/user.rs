use serde::{Deserialize, Serialize};

use super::properties::Properties;

/// Account record. Ownership and visibility checks happen outside the engine;
/// the storage layer only persists these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub properties: Properties,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            admin: false,
            properties: Properties::new(),
        }
    }
}
