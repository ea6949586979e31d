//! Synchronisation configuration.
//!
//! A [`SyncConfig`] is shared (behind an `Arc`) by every capability a
//! descriptor owns. It can be built in code or loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What to do when a singleton relation is offered more than one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonPolicy {
    /// Keep the smallest candidate under the value's total order.
    #[default]
    Smallest,
    /// Refuse to reconcile; the call reports a cardinality violation.
    Reject,
}

/// Limits for breadth-first descriptor expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionBounds {
    /// Maximum distance from the root; the root is at depth 0.
    pub max_depth: usize,
    /// Maximum number of descriptors held by one arena, root included.
    pub max_descriptors: usize,
}

impl Default for ExpansionBounds {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_descriptors: 256,
        }
    }
}

impl ExpansionBounds {
    /// Validate bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_descriptors == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "expansion.max_descriptors must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration of the reconciliation protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tie-break for singleton relations.
    pub singleton_policy: SingletonPolicy,
    /// Emit `Unchanged` intents for values present on both sides.
    pub report_unchanged: bool,
    /// Default bounds for descriptor expansion.
    pub expansion: ExpansionBounds,
}

impl SyncConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.expansion.validate()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }
}
