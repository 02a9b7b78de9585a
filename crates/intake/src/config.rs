//! Intake configuration
//!
//! Loaded from the environment once at startup, validated, then passed down
//! by value. Components never read the environment themselves.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Ledger table holding locks and job records
    pub ledger_table_name: String,

    /// Lifetime of an idempotency lock, in seconds
    pub idempotency_ttl_seconds: i64,

    /// Destination prefix for staged copies
    pub staged_prefix: String,

    /// Only keys under this prefix are admitted
    pub raw_prefix: String,

    /// Only keys with this extension are admitted (lowercase)
    pub accept_suffix: String,

    /// Read the body and fingerprint by SHA-256; when off, admission falls
    /// back to the store content tag or the object size
    pub compute_content_hash: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            ledger_table_name: "IntakeTracker".to_string(),
            idempotency_ttl_seconds: 600,
            staged_prefix: "staged/".to_string(),
            raw_prefix: "intake-raw/".to_string(),
            accept_suffix: ".docx".to_string(),
            compute_content_hash: true,
        }
    }
}

impl IntakeConfig {
    /// Load from the environment, falling back to defaults, and validate
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let idempotency_ttl_seconds = match std::env::var("IDEMPOTENCY_TTL_SECONDS") {
            Ok(raw) => raw.parse::<i64>().map_err(|e| {
                ConfigError::Invalid(format!("IDEMPOTENCY_TTL_SECONDS {:?}: {}", raw, e))
            })?,
            Err(_) => defaults.idempotency_ttl_seconds,
        };

        let config = Self {
            ledger_table_name: std::env::var("LEDGER_TABLE_NAME")
                .unwrap_or(defaults.ledger_table_name),
            idempotency_ttl_seconds,
            staged_prefix: std::env::var("STAGED_PREFIX").unwrap_or(defaults.staged_prefix),
            raw_prefix: std::env::var("RAW_PREFIX").unwrap_or(defaults.raw_prefix),
            accept_suffix: std::env::var("ACCEPT_SUFFIX")
                .unwrap_or(defaults.accept_suffix)
                .to_lowercase(),
            compute_content_hash: std::env::var("COMPUTE_CONTENT_HASH")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.compute_content_hash),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the intake path relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idempotency_ttl_seconds < 1 {
            return Err(ConfigError::Invalid(format!(
                "IDEMPOTENCY_TTL_SECONDS must be >= 1, got {}",
                self.idempotency_ttl_seconds
            )));
        }

        if self.staged_prefix.is_empty() || !self.staged_prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "STAGED_PREFIX must be non-empty and end with '/', got {:?}",
                self.staged_prefix
            )));
        }

        if self.raw_prefix.is_empty() || !self.raw_prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "RAW_PREFIX must be non-empty and end with '/', got {:?}",
                self.raw_prefix
            )));
        }

        if !self.accept_suffix.starts_with('.') || self.accept_suffix.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "ACCEPT_SUFFIX must start with '.', got {:?}",
                self.accept_suffix
            )));
        }

        // A staged copy under the raw prefix would re-trigger intake
        if self.staged_prefix.starts_with(&self.raw_prefix) {
            return Err(ConfigError::Invalid(format!(
                "STAGED_PREFIX {:?} must not fall under RAW_PREFIX {:?}",
                self.staged_prefix, self.raw_prefix
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_config_default() {
        let config = IntakeConfig::default();
        assert_eq!(config.ledger_table_name, "IntakeTracker");
        assert_eq!(config.idempotency_ttl_seconds, 600);
        assert_eq!(config.staged_prefix, "staged/");
        assert_eq!(config.raw_prefix, "intake-raw/");
        assert_eq!(config.accept_suffix, ".docx");
        assert!(config.compute_content_hash);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_ttl() {
        let config = IntakeConfig {
            idempotency_ttl_seconds: 0,
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unterminated_prefix() {
        let config = IntakeConfig {
            staged_prefix: "staged".to_string(),
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = IntakeConfig {
            raw_prefix: String::new(),
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_suffix() {
        let config = IntakeConfig {
            accept_suffix: "docx".to_string(),
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = IntakeConfig {
            accept_suffix: ".".to_string(),
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_staged_under_raw() {
        let config = IntakeConfig {
            staged_prefix: "intake-raw/staged/".to_string(),
            ..IntakeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
