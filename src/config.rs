use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Error, Result};

/// Engine settings. Every field has a default, so an empty TOML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A bus whose energization magnitude is below this value is isolated.
    /// Expressed in the oracle's units (volts for the connectivity oracle).
    pub deenergized_threshold: f64,

    /// Magnitude the connectivity oracle reports on energized buses.
    pub source_voltage: f64,

    /// Lines whose name starts with this prefix are switches unless the
    /// declaration says `switch=n`.
    pub switch_prefix: String,

    /// Switches that are normally open (NA) regardless of their declaration.
    pub normally_open: Vec<String>,

    /// Explicit candidate list. `None` means every NF switch.
    pub candidates: Option<Vec<String>>,

    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deenergized_threshold: 1.0,
            source_voltage: 2401.8,
            switch_prefix: "sw".to_string(),
            normally_open: Vec::new(),
            candidates: None,
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("bad bind address: {e}")))
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.deenergized_threshold.is_finite() || self.deenergized_threshold <= 0.0 {
            return Err(Error::Config(format!(
                "deenergized_threshold must be positive, got {}",
                self.deenergized_threshold
            )));
        }
        if self.source_voltage <= self.deenergized_threshold {
            return Err(Error::Config(format!(
                "source_voltage {} does not exceed deenergized_threshold {}",
                self.source_voltage, self.deenergized_threshold
            )));
        }
        Ok(())
    }

    /// Whether the configuration forces `name` to be normally open.
    pub fn is_normally_open(&self, name: &str) -> bool {
        self.normally_open
            .iter()
            .any(|na| na.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.deenergized_threshold, 1.0);
    }

    #[test]
    fn reads_threshold_and_switch_lists() {
        let config = EngineConfig::from_toml_str(
            r#"
            deenergized_threshold = 5.0
            normally_open = ["SW7", "sw8"]
            candidates = ["sw3", "sw5"]

            [server]
            port = 3000
            "#,
        )
        .unwrap();
        assert_eq!(config.deenergized_threshold, 5.0);
        assert!(config.is_normally_open("sw7"));
        assert!(!config.is_normally_open("sw1"));
        assert_eq!(config.candidates.as_deref().unwrap().len(), 2);
        assert_eq!(config.server.socket_addr().unwrap().port(), 3000);
    }

    #[test]
    fn sample_file_matches_defaults() {
        let config = EngineConfig::from_toml_str(include_str!("../isolator.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn rejects_non_positive_threshold() {
        let err = EngineConfig::from_toml_str("deenergized_threshold = 0.0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
