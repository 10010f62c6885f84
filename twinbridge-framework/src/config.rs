//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{BridgeError, Result};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// loading, validation, and access to the logging section.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use twinbridge_framework::{BridgeConfig, BridgeError, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub logging: LoggingConfig,
///     pub topic: String,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> twinbridge_framework::Result<()> {
///         if self.topic.is_empty() {
///             return Err(BridgeError::validation("topic must not be empty"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse configuration from JSON5 text and validate it.
    fn parse(content: &str) -> Result<Self> {
        Self::parse_with(content, |_| {})
    }

    /// Parse configuration, let `customize` adjust it, then validate.
    ///
    /// Used to layer CLI or environment overrides (e.g. secrets) on top of
    /// the file before validation runs.
    fn parse_with<F>(content: &str, customize: F) -> Result<Self>
    where
        F: FnOnce(&mut Self),
    {
        let mut config: Self = json5::from_str(content)?;
        customize(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, |_| {})
    }

    /// Load configuration from a file path, applying `customize` before validation.
    fn load_with<F>(path: impl AsRef<Path>, customize: F) -> Result<Self>
    where
        F: FnOnce(&mut Self),
    {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse_with(&content, customize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        logging: LoggingConfig,
        topic: String,
    }

    impl BridgeConfig for TestConfig {
        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn validate(&self) -> Result<()> {
            if self.topic.is_empty() {
                return Err(BridgeError::validation("topic must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_parse_runs_validation() {
        let result = TestConfig::parse(r#"{ topic: "" }"#);
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));

        let config = TestConfig::parse(r#"{ topic: "plant/telemetry" }"#).unwrap();
        assert_eq!(config.logging().level, "info");
    }

    #[test]
    fn test_parse_with_override_before_validation() {
        let config = TestConfig::parse_with(r#"{ topic: "" }"#, |c| {
            c.topic = "from/env".to_string();
        })
        .unwrap();
        assert_eq!(config.topic, "from/env");
    }

    #[test]
    fn test_parse_error() {
        let result = TestConfig::parse("{ topic: ");
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }
}
