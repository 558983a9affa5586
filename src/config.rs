//! Per-replica document configuration
//!
//! Stored as JSON next to whatever the application keeps for the replica.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::convergent::SiteId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Settings for one replica of a document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Site id used for every locally authored node
    pub site: SiteId,

    /// Priority of local nodes when the caller does not ask for one
    #[serde(default)]
    pub default_priority: u32,
}

impl DocumentConfig {
    pub fn new(site: impl Into<SiteId>) -> Self {
        Self {
            site: site.into(),
            default_priority: 0,
        }
    }

    /// Fresh configuration with a random site id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Load from path if it exists, otherwise generate and save.
    pub fn load_or_generate(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::generate();
            config.save(path)?;
            log::debug!("generated site {} at {}", config.site, path.display());
            Ok(config)
        }
    }
}
