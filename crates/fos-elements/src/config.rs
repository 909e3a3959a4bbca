//! Engine Configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When a mutation batch reaches its checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    /// Dropping a `MutationBatch` drains pending reactions
    #[default]
    EndOfBatch,
    /// Reactions drain only on `perform_checkpoint` / `run_until_idle`
    Explicit,
}

/// Engine configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Checkpoint trigger
    pub checkpoint_mode: CheckpointMode,

    /// Checkpoints `run_until_idle` may run before leaving work pending
    pub max_checkpoints_per_flush: usize,

    /// Report panicking callbacks as failures instead of unwinding
    pub catch_panics: bool,

    /// Names rejected by `define` in addition to the built-in reserved set
    pub reserved_names: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_mode: CheckpointMode::EndOfBatch,
            max_checkpoints_per_flush: 16,
            catch_panics: true,
            reserved_names: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_checkpoints_per_flush == 0 {
            return Err(ConfigError::ZeroCheckpointBudget);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "checkpoint_mode": "explicit" }"#).unwrap();
        assert_eq!(config.checkpoint_mode, CheckpointMode::Explicit);
        assert_eq!(config.max_checkpoints_per_flush, 16);
        assert!(config.catch_panics);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let result = EngineConfig::from_json(r#"{ "max_checkpoints_per_flush": 0 }"#);
        assert!(matches!(result, Err(ConfigError::ZeroCheckpointBudget)));
    }

    #[test]
    fn test_malformed_json() {
        let result = EngineConfig::from_json("{ checkpoint_mode: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
