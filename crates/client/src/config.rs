//! Session and CLI configuration.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Knobs the core exposes for a single session's socket and buffer pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Remote device identifier, copied verbatim into every frame header.
    pub devid: u32,
    pub keepalive_idle_secs: u64,
    pub keepalive_probe_count: u32,
    pub keepalive_interval_secs: u64,
    /// Bound on the session-scoped transfer buffer pool.
    pub buffer_pool_capacity: usize,
}

impl SessionConfig {
    pub fn keepalive_idle(&self) -> Duration {
        Duration::from_secs(self.keepalive_idle_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            devid: 0,
            keepalive_idle_secs: 30,
            keepalive_probe_count: 5,
            keepalive_interval_secs: 5,
            buffer_pool_capacity: 32,
        }
    }
}

/// Top-level file-backed configuration for the CLI binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub log_level: String,
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            log_level: "info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = [Self::default_path(), PathBuf::from("/etc/usbip-client.toml")];
            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("no configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config file: {}", config_path.display()))?;
        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;
        config.validate()?;

        tracing::info!("loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load config: {e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }
        fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::info!("saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbip-client").join("client.toml")
        } else {
            PathBuf::from(".config/usbip-client/client.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        if self.session.buffer_pool_capacity == 0 {
            return Err(anyhow!("buffer_pool_capacity must be greater than zero"));
        }
        Ok(())
    }
}

/// Legacy helper retained for CLI `--config` arguments that use `~`.
pub fn load_config(path: &str) -> Result<ClientConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ClientConfig::load(Some(path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_keepalive() {
        let config = ClientConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(config.session.buffer_pool_capacity > 0);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = ClientConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.log_level, parsed.log_level);
        assert_eq!(config.session.devid, parsed.session.devid);
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut config = ClientConfig::default();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity_pool() {
        let mut config = ClientConfig::default();
        config.session.buffer_pool_capacity = 0;
        assert!(config.validate().is_err());
    }
}
