//! Main application configuration
//!
//! This module defines the configuration structures for the matchboard
//! dashboard, including environment variable and TOML file loading and
//! validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub broadcast: BroadcastSettings,
    pub demo: DemoSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address the HTTP server binds to
    pub host: String,
    /// Port for the dashboard, websocket and health endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Snapshot fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// How often cancelled subscribers are swept, in milliseconds
    pub sweep_interval_ms: u64,
    /// Indent snapshots before publishing them
    pub pretty_snapshots: bool,
}

/// Built-in demo producers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Publish service uptime under the `uptime` field
    pub enable_uptime: bool,
    /// Publish simulated player statuses under the `clients` field
    pub enable_clients: bool,
    /// Number of simulated players
    pub fake_clients: usize,
    /// Seconds each simulated player spends in one status
    pub client_cycle_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "matchboard".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            http_port: 51507,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            pretty_snapshots: true,
        }
    }
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            enable_uptime: true,
            enable_clients: true,
            fake_clients: 5,
            client_cycle_seconds: 5,
        }
    }
}

/// Parse an environment variable into `target` if it is set
fn env_override<T: std::str::FromStr>(name: &str, target: &mut T) -> Result<()> {
    if let Ok(value) = env::var(name) {
        *target = value
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value))?;
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Environment variables still
    /// override values from the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text; missing values use defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.host = host;
        }
        env_override("HTTP_PORT", &mut self.service.http_port)?;
        env_override(
            "SHUTDOWN_TIMEOUT_SECONDS",
            &mut self.service.shutdown_timeout_seconds,
        )?;

        // Broadcast settings
        env_override("SWEEP_INTERVAL_MS", &mut self.broadcast.sweep_interval_ms)?;
        env_override("PRETTY_SNAPSHOTS", &mut self.broadcast.pretty_snapshots)?;

        // Demo settings
        env_override("ENABLE_UPTIME_COMPONENT", &mut self.demo.enable_uptime)?;
        env_override("ENABLE_CLIENTS_COMPONENT", &mut self.demo.enable_clients)?;
        env_override("DEMO_FAKE_CLIENTS", &mut self.demo.fake_clients)?;
        env_override(
            "DEMO_CLIENT_CYCLE_SECONDS",
            &mut self.demo.client_cycle_seconds,
        )?;

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the subscriber sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast.sweep_interval_ms)
    }

    /// Get the simulated client status period as Duration
    pub fn client_cycle(&self) -> Duration {
        Duration::from_secs(self.demo.client_cycle_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate server settings
    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.host.is_empty() {
        return Err(anyhow!("HTTP host cannot be empty"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate broadcast settings
    if config.broadcast.sweep_interval_ms == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }

    // Validate demo settings
    if config.demo.enable_clients && config.demo.client_cycle_seconds == 0 {
        return Err(anyhow!("Client cycle must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.http_port, 51507);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [service]
            http_port = 9000

            [broadcast]
            sweep_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.service.http_port, 9000);
        assert_eq!(config.service.name, "matchboard");
        assert_eq!(config.sweep_interval(), Duration::from_millis(250));
        assert!(config.broadcast.pretty_snapshots);
        assert_eq!(config.demo.fake_clients, 5);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.broadcast.sweep_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.demo.client_cycle_seconds = 0;
        assert!(validate_config(&config).is_err());

        config.demo.enable_clients = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(AppConfig::from_toml("[service\nhttp_port = ").is_err());
    }
}
