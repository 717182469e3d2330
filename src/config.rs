//! Engine configuration.
//!
//! ```toml
//! compliance_threshold = 95
//! model_policy = "snapshot_on_create"
//! initial_shipment_id = 1
//! ```
//!
//! Unknown keys are rejected. TOML loading needs the `config-file` feature
//! (on by default).

use std::fmt;
#[cfg(feature = "config-file")]
use std::path::Path;

use coldchain_decision::ComplianceThreshold;
use coldchain_kernel::ShipmentId;
use serde::{Deserialize, Serialize};

/// Which model settlement uses for a shipment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPolicy {
    /// Every settlement reads the current global model, including for
    /// shipments created before the last model change.
    #[default]
    Shared,
    /// The complete model is frozen into each shipment at creation.
    SnapshotOnCreate,
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum posterior, in percent, both factors must reach to pay.
    pub compliance_threshold: u8,
    /// Shared or per-shipment model.
    pub model_policy: ModelPolicy,
    /// Id given to the first shipment.
    pub initial_shipment_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compliance_threshold: coldchain_decision::DEFAULT_THRESHOLD,
            model_policy: ModelPolicy::Shared,
            initial_shipment_id: ShipmentId::FIRST.get(),
        }
    }
}

impl EngineConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compliance_threshold > 100 {
            return Err(ConfigError::Validation(format!(
                "compliance_threshold must be in [0, 100], got {}",
                self.compliance_threshold
            )));
        }
        if self.initial_shipment_id == 0 {
            return Err(ConfigError::Validation(
                "initial_shipment_id must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Validated threshold.
    pub fn threshold(&self) -> Result<ComplianceThreshold, ConfigError> {
        ComplianceThreshold::new(self.compliance_threshold)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// First shipment id.
    pub fn first_shipment(&self) -> ShipmentId {
        ShipmentId::new(self.initial_shipment_id)
    }
}

/// Errors loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The text is not valid TOML for [`EngineConfig`].
    Parse(String),
    /// A value is out of range.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(_) | Self::Validation(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Loads [`EngineConfig`] from TOML.
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse and validate a TOML document.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    #[cfg(feature = "config-file")]
    pub fn from_file(path: &Path) -> Result<EngineConfig, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(text: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
