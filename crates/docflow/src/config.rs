//! Core configuration, loaded from TOML.
//!
//! ```toml
//! [rounding]
//! display_digits = 10
//!
//! [limits]
//! max_inverse_depth = 64
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub rounding: RoundingConfig,
    pub limits: LimitsConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Document-wide display defaults. Components inherit these unless an
/// ancestor or the component itself overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundingConfig {
    pub display_digits: u32,
    pub display_decimals: Option<u32>,
    pub pad_zeros: bool,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            display_digits: 10,
            display_decimals: None,
            pad_zeros: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest chain of inverse definitions followed for one request.
    pub max_inverse_depth: usize,
    /// Expansion passes per update before the flush gives up.
    pub max_expansion_rounds: usize,
    /// Upper bound on the replacements one composite may produce.
    pub max_replacements: usize,
    /// Upper bound on the entries of one array variable.
    pub max_array_entries: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_inverse_depth: 64,
            max_expansion_rounds: 100,
            max_replacements: 10_000,
            max_array_entries: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Record every actual value change so `why_did_change` can answer.
    pub trace_changes: bool,
    /// Log failed inversions at warn level instead of debug.
    pub log_inversion_failures: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "cannot read configuration: {error}"),
            Self::Parse(error) => write!(f, "invalid configuration: {error}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Parse(error) => Some(error),
        }
    }
}

impl CoreConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(ConfigError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config = Self::from_toml_str(&source)?;
        log::debug!("loaded core configuration: {config:?}");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            [rounding]
            display_digits = 4

            [diagnostics]
            trace_changes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.rounding.display_digits, 4);
        assert!(!config.rounding.pad_zeros);
        assert_eq!(config.limits, LimitsConfig::default());
        assert!(config.diagnostics.trace_changes);
    }

    #[test]
    fn rejects_wrong_types() {
        let error = CoreConfig::from_toml_str("[limits]\nmax_inverse_depth = \"deep\"").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
