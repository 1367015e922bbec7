//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

use crate::viewport::ViewMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Channels to select automatically when the live view opens
    pub channels: Vec<ChannelSpec>,

    /// Grid layout of the live view ("1x1", "2x2", "3x3", "4x4")
    pub view_mode: String,

    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Stream-control backend configuration
    pub stream: StreamConfig,
}

/// One pre-selected device camera channel
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChannelSpec {
    pub imei: String,
    pub channel: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Base URL of the stream-control endpoint
    pub base_url: String,

    /// Bound on every start/stop call in seconds; a call exceeding it is
    /// treated as failed
    pub timeout_seconds: u64,

    /// Bearer token forwarded to the backend, when required
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the rolling log file
    pub file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            view_mode: "2x2".to_string(),
            log_level: "info".to_string(),
            log: LogConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 10,
            auth_token: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/fleetcam.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // FLEETCAM_CHANNELS - comma-separated imei:channel pairs
        if let Ok(channels) = env::var("FLEETCAM_CHANNELS") {
            let parsed: Vec<ChannelSpec> = channels
                .split(',')
                .filter_map(|entry| {
                    let (imei, channel) = entry.trim().split_once(':')?;
                    Some(ChannelSpec {
                        imei: imei.to_string(),
                        channel: channel.parse().ok()?,
                    })
                })
                .collect();
            if !parsed.is_empty() {
                self.channels = parsed;
            }
        }

        // FLEETCAM_VIEW_MODE - grid layout
        if let Ok(view_mode) = env::var("FLEETCAM_VIEW_MODE") {
            self.view_mode = view_mode;
        }

        // FLEETCAM_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("FLEETCAM_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // FLEETCAM_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("FLEETCAM_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // FLEETCAM_STREAM_BASE_URL - stream-control endpoint
        if let Ok(base_url) = env::var("FLEETCAM_STREAM_BASE_URL") {
            self.stream.base_url = base_url;
        }

        // FLEETCAM_STREAM_TIMEOUT_SECONDS - call timeout
        if let Ok(timeout) = env::var("FLEETCAM_STREAM_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.stream.timeout_seconds = value;
            }
        }

        // FLEETCAM_STREAM_AUTH_TOKEN - bearer token
        if let Ok(token) = env::var("FLEETCAM_STREAM_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                self.stream.auth_token = Some(token);
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.stream.base_url.trim().is_empty() {
            anyhow::bail!("Stream backend base URL must not be empty");
        }

        if self.stream.timeout_seconds == 0 {
            anyhow::bail!("Stream call timeout must be greater than 0");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        ViewMode::from_str(&self.view_mode)?;

        for spec in &self.channels {
            if spec.imei.trim().is_empty() {
                anyhow::bail!("Channel entry with empty IMEI");
            }
            if spec.channel == 0 {
                anyhow::bail!("Channel numbers are 1-based: {}", spec.imei);
            }
        }

        Ok(())
    }

    /// Parsed grid layout
    pub fn view_mode(&self) -> Result<ViewMode> {
        ViewMode::from_str(&self.view_mode)
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!("{:#?}", self);
        Ok(())
    }

    /// Display configuration management help
    pub fn display_help() -> Result<()> {
        println!("Configuration management commands:");
        println!("  fleetcam config show    - Show current configuration");
        println!("  fleetcam config set <key> <value> - Set configuration value");
        println!("  fleetcam config reset   - Reset to default configuration");
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(
        action: &Option<crate::cli::ConfigAction>,
        config_file: &str,
    ) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) => {
                let config = Config::load_or_default(config_file);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Set { key, value }) => {
                let mut config = Config::load_or_default(config_file);
                config.set_value(key, value)?;
                config.validate()?;
                config.save_to_file(config_file)?;
                println!("Updated {} = {}", key, value);
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let config = Config::default();
                config.save_to_file(config_file)?;
                config.display()?;
            }
            None => {
                Config::display_help()?;
            }
        }
        Ok(())
    }

    fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key.to_ascii_lowercase().as_str() {
            "view_mode" | "view-mode" => {
                ViewMode::from_str(value)?;
                self.view_mode = value.to_string();
            }
            "log_level" | "log-level" => {
                self.log_level = value.to_string();
            }
            "stream.base_url" | "stream.base-url" => {
                self.stream.base_url = value.to_string();
            }
            "stream.timeout_seconds" | "stream.timeout-seconds" => {
                self.stream.timeout_seconds = value
                    .parse()
                    .with_context(|| format!("Invalid timeout value: {}", value))?;
            }
            other => anyhow::bail!("Unsupported config key: {}", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.view_mode().unwrap(), ViewMode::TwoByTwo);
    }

    #[test]
    fn test_invalid_view_mode_rejected() {
        let mut config = Config::default();
        config.view_mode = "6x6".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_channel_rejected() {
        let mut config = Config::default();
        config.channels.push(ChannelSpec {
            imei: "123456789012345".to_string(),
            channel: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.channels.push(ChannelSpec {
            imei: "123456789012345".to_string(),
            channel: 1,
        });
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.channels, deserialized.channels);
        assert_eq!(config.view_mode, deserialized.view_mode);
    }

    #[test]
    fn test_config_file_operations() {
        let config = Config::default();
        let temp_file = NamedTempFile::new().unwrap();

        // Test save
        config.save_to_file(temp_file.path()).unwrap();

        // Test load
        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.view_mode, loaded_config.view_mode);
        assert_eq!(config.stream.base_url, loaded_config.stream.base_url);
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("view_mode", "3x3").unwrap();
        assert_eq!(config.view_mode, "3x3");
        assert!(config.set_value("view_mode", "bogus").is_err());
        assert!(config.set_value("nonsense", "1").is_err());
    }
}
