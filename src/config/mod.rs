//! Configuration
//!
//! Settings come from an optional TOML file; absent sections and fields take
//! their defaults. Command-line overrides are applied on top.

mod schema;

pub use schema::*;

use std::path::Path;

use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AppError::Config(format!("invalid config: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, apply overrides, then validate
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.signaling.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.signaling.port = port;
        }
        if let Some(path) = &overrides.path {
            self.signaling.path = path.clone();
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.signaling.url(), "ws://127.0.0.1:8080/wssrv");
        assert_eq!(config.webrtc.stun_servers, vec!["stun:stun.l.google.com:19302"]);
        assert_eq!(config.webrtc.data_channel_label, "data_channel");
        assert_eq!((config.render.width, config.render.height), (960, 544));
        assert_eq!(config.render.fps, 60);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [signaling]
            port = 9000

            [[webrtc.turn_servers]]
            urls = ["turn:turn.example.com:3478"]
            username = "user"
            credential = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.signaling.port, 9000);
        assert_eq!(config.signaling.host, "127.0.0.1");
        assert_eq!(config.signaling.path, "/wssrv");
        assert_eq!(config.webrtc.turn_servers.len(), 1);
        assert_eq!(config.webrtc.turn_servers[0].username, "user");
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[signaling\nport = 1"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[signaling]\nport = \"eighty\""),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        config.render.fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.render.height = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.signaling.path = "wssrv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_file_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[signaling]\nhost = \"10.0.0.2\"\nport = 7000").unwrap();

        let overrides = ConfigOverrides {
            port: Some(7443),
            path: Some("/signal".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.signaling.url(), "ws://10.0.0.2:7443/signal");
    }

    #[test]
    fn test_resolve_rejects_bad_override() {
        let overrides = ConfigOverrides {
            path: Some("signal".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(None, &overrides).is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = AppConfig::default();
        config.signaling.reconnect_delay_ms = 0;
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.signaling, config.signaling);
    }
}
