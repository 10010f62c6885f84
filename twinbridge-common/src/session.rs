use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Zenoh modes accepted in [`ZenohConfig::mode`].
pub const ZENOH_MODES: [&str; 3] = ["client", "peer", "router"];

impl ZenohConfig {
    /// Check the mode string without touching the network.
    pub fn validate(&self) -> Result<()> {
        if ZENOH_MODES.contains(&self.mode.as_str()) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                self.mode
            )))
        }
    }

    /// Translate into a native Zenoh configuration.
    pub fn to_zenoh_config(&self) -> Result<zenoh::Config> {
        self.validate()?;

        let mut zenoh_config = zenoh::Config::default();
        zenoh_config
            .insert_json5("mode", &format!("\"{}\"", self.mode))
            .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

        for (key, endpoints) in [
            ("connect/endpoints", &self.connect),
            ("listen/endpoints", &self.listen),
        ] {
            if endpoints.is_empty() {
                continue;
            }
            let endpoints_json = serde_json::to_string(endpoints)?;
            zenoh_config
                .insert_json5(key, &endpoints_json)
                .map_err(|e| Error::Config(format!("Failed to set {}: {}", key, e)))?;
        }

        Ok(zenoh_config)
    }
}

/// Open a Zenoh session using the provided configuration.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = config.to_zenoh_config()?;

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_modes() {
        for mode in ZENOH_MODES {
            let config = ZenohConfig {
                mode: mode.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_invalid_mode() {
        let config = ZenohConfig {
            mode: "broker".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(config.to_zenoh_config().is_err());
    }

    #[test]
    fn test_client_endpoints() {
        let config = ZenohConfig {
            mode: "client".to_string(),
            connect: vec!["tcp/127.0.0.1:7447".to_string()],
            listen: Vec::new(),
        };
        assert!(config.to_zenoh_config().is_ok());
    }
}
