//! Configuration
//!
//! TigerStyle: explicit defaults, validated overrides.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DATABASE_NAME_DEFAULT, DATABASE_VERSION_DEFAULT, ENV_CODEC, ENV_DB_NAME, ENV_DB_VERSION,
    ENV_DEBUG, ENV_FORCE_FLAT, ENV_STORE_NAME, NAME_BYTES_MAX, STORE_NAME_DEFAULT,
};
use crate::diagnostics::Diagnostics;
use crate::storage::CodecKind;

/// Storage configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Emit backend errors through `tracing`
    pub debug: bool,
    /// Database opened on the transactional engine
    pub database_name: String,
    /// Schema version of that database
    pub database_version: u32,
    /// Object store holding the pairs
    pub store_name: String,
    /// Codec of the flat backend
    pub codec: CodecKind,
    /// Ignore the transactional engine even if the host has one
    pub force_flat: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            debug: false,
            database_name: DATABASE_NAME_DEFAULT.to_string(),
            database_version: DATABASE_VERSION_DEFAULT,
            store_name: STORE_NAME_DEFAULT.to_string(),
            codec: CodecKind::default(),
            force_flat: false,
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by `KVSHIM_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is set to an unparseable or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    ///
    /// # Errors
    /// Returns error if a value is unparseable or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(ENV_DEBUG, &value)?;
        }
        if let Some(value) = lookup(ENV_DB_NAME) {
            config.database_name = value;
        }
        if let Some(value) = lookup(ENV_DB_VERSION) {
            config.database_version = value.parse().map_err(|_| ConfigError::Invalid {
                name: ENV_DB_VERSION,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_STORE_NAME) {
            config.store_name = value;
        }
        if let Some(value) = lookup(ENV_CODEC) {
            config.codec = value.parse().map_err(|_| ConfigError::Invalid {
                name: ENV_CODEC,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_FORCE_FLAT) {
            config.force_flat = parse_flag(ENV_FORCE_FLAT, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check names and version.
    ///
    /// # Errors
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name("database_name", &self.database_name)?;
        check_name("store_name", &self.store_name)?;
        if self.database_version == 0 {
            return Err(ConfigError::Invalid {
                name: "database_version",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Diagnostics matching the debug switch.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.debug)
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > NAME_BYTES_MAX {
        return Err(ConfigError::Invalid {
            name: field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting has an unusable value
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// Offending value
        value: String,
    },
}

// =============================================================================
// Tests
// =============================================================================
