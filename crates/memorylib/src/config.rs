//! Access configuration
//!
//! Selects how pointer chains are walked for a given target. Stored as
//! pretty JSON so it can sit next to whatever offsets a caller keeps.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::memory::{EmptyChain, PointerWidth};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Width of intermediate pointers in chain walks
    pub pointer_width: PointerWidth,
    /// Meaning of an empty offset chain
    pub empty_chain: EmptyChain,
}

impl AccessConfig {
    pub fn builder() -> AccessConfigBuilder {
        AccessConfigBuilder::default()
    }

    /// Load configuration from a JSON file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        debug!(
            "Loaded access config from {}: {:?}",
            path.as_ref().display(),
            config
        );
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved access config to {}", path.as_ref().display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AccessConfigBuilder {
    config: AccessConfig,
}

impl AccessConfigBuilder {
    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.config.pointer_width = width;
        self
    }

    pub fn empty_chain(mut self, mode: EmptyChain) -> Self {
        self.config.empty_chain = mode;
        self
    }

    pub fn build(self) -> AccessConfig {
        self.config
    }
}
