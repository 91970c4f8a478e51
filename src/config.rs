use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Compiler configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Use the UNWIND fast path for structurally uniform creates
    pub batch_create: bool,

    /// Inject authorization rules declared on the model
    pub authorization: bool,

    /// Message raised by every failed validate rule
    #[validate(length(min = 1, message = "Forbidden message cannot be empty"))]
    pub forbidden_message: String,

    /// Pass `[0]` instead of `[]` as the message-parameters argument of apoc validate calls
    pub validate_trailing_params: bool,

    /// Maximum nesting depth of selections, filters and mutation inputs
    #[validate(range(min = 1, max = 64, message = "Max depth must be between 1 and 64"))]
    pub max_depth: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            batch_create: true,
            authorization: true,
            forbidden_message: "Forbidden".to_string(),
            validate_trailing_params: true,
            max_depth: 32,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            batch_create: parse_env_var("GRAPHCYPHER_BATCH_CREATE", "true")?,
            authorization: parse_env_var("GRAPHCYPHER_AUTHORIZATION", "true")?,
            forbidden_message: env::var("GRAPHCYPHER_FORBIDDEN_MESSAGE")
                .unwrap_or_else(|_| "Forbidden".to_string()),
            validate_trailing_params: parse_env_var("GRAPHCYPHER_VALIDATE_TRAILING_PARAMS", "true")?,
            max_depth: parse_env_var("GRAPHCYPHER_MAX_DEPTH", "32")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.batch_create);
        assert!(config.validate_trailing_params);
        assert_eq!(config.forbidden_message, "Forbidden");
    }

    #[test]
    fn test_invalid_depth() {
        let config = CompilerConfig {
            max_depth: 65,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_message() {
        let config = CompilerConfig {
            forbidden_message: "".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_create: false\nmax_depth: 8").unwrap();
        let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
        assert!(!config.batch_create);
        assert_eq!(config.max_depth, 8);
        assert!(config.authorization);
    }
}
