//! # World Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! mode = "server"
//! entity_capacity = 4096
//! trait_pool_limit = 256
//! deferred_batch_limit = 0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_shared::WorldMode;

use crate::error::{CoreError, CoreResult};

/// Upper bound accepted for `entity_capacity`.
const MAX_ENTITY_CAPACITY: usize = 1 << 24;

/// Settings for one `World`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Role of the world. Decides the id range and which logic runs.
    pub mode: WorldMode,
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Maximum pooled instances kept per trait type. `0` keeps all.
    pub trait_pool_limit: usize,
    /// Maximum deferred actions run per frame. `0` runs everything that was
    /// queued when the frame ended.
    pub deferred_batch_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            mode: WorldMode::Standalone,
            entity_capacity: 256,
            trait_pool_limit: 0,
            deferred_batch_limit: 0,
        }
    }
}

impl WorldConfig {
    /// Default configuration for the given mode.
    #[must_use]
    pub fn with_mode(mode: WorldMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text is not valid TOML, has unknown
    /// keys, or fails validation.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded world config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.entity_capacity > MAX_ENTITY_CAPACITY {
            return Err(CoreError::InvalidConfig(format!(
                "entity_capacity {} exceeds {MAX_ENTITY_CAPACITY}",
                self.entity_capacity
            )));
        }
        Ok(())
    }
}
