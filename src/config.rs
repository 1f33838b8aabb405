use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, str::FromStr};

use thiserror::Error;
use tracing::Level;

use crate::{value::NOT_APPLICABLE_SENTINEL, Error, InternalResult};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub trait ConfigValidation {
    fn validate(&self) -> Result<(), ConfigError>;

    fn validate_with_context(&self, context: &str) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::ValidationError(format!("{} in {}", e, context)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fact-map string decoded as "not applicable".
    #[serde(default = "default_sentinel")]
    pub not_applicable_sentinel: String,

    /// Make `validate` fail when it has findings.
    #[serde(default)]
    pub fail_on_unknown_variables: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Document type assumed by `decide` when none is given.
    #[serde(default)]
    pub default_doc_type: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            not_applicable_sentinel: default_sentinel(),
            fail_on_unknown_variables: false,
            log_level: default_log_level(),
            default_doc_type: None,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> InternalResult<Self> {
        let config: Self = from_file(path)?;
        config.validate_with_context("engine config")?;
        Ok(config)
    }
}

impl ConfigValidation for EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.not_applicable_sentinel.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "not_applicable_sentinel".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::MissingField("log_level".to_string()));
        }
        if Level::from_str(&self.log_level).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                message: format!("unknown level `{}`", self.log_level),
            });
        }
        Ok(())
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_sentinel() -> String {
    NOT_APPLICABLE_SENTINEL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: EngineConfig = from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.not_applicable_sentinel, "__NOT_APPLICABLE__");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config: EngineConfig = from_str(r#"{"not_applicable_sentinel": ""}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "not_applicable_sentinel"
        ));

        let config: EngineConfig = from_str(r#"{"log_level": " "}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(ref field)) if field == "log_level"
        ));

        let config: EngineConfig = from_str(r#"{"log_level": "loud"}"#).unwrap();
        let err = config.validate_with_context("test").unwrap_err();
        assert!(err.to_string().contains("in test"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexgate.json");
        std::fs::write(&path, r#"{"fail_on_unknown_variables": true, "log_level": "debug"}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert!(config.fail_on_unknown_variables);
        assert_eq!(config.log_level, "debug");
        assert!(EngineConfig::from_file(dir.path().join("absent.json")).is_err());
    }
}
