//! Persistent session configuration
//!
//! Stores device identifiers, front-end and stream settings in a JSON file at
//! `<data_dir>/phasecollect/session.json`. Every field has a default, so a
//! partial file loads.

use crate::device::TriggerSignal;
use crate::error::SamplerError;
use crate::sampler::channel::ChannelConfig;
use crate::sampler::stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_master() -> String {
    "*:serial=8708f9acef41465c8f457fdc94526d93".to_string()
}

fn default_slave() -> String {
    "*:serial=b81fded3527b42adbd09f31345c60584".to_string()
}

fn default_trigger_signal() -> TriggerSignal {
    TriggerSignal::MiniExp1
}

/// Everything needed to run a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device identifier of the radio that drives clock and trigger
    #[serde(default = "default_master")]
    pub master: String,
    #[serde(default = "default_slave")]
    pub slave: String,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default = "default_trigger_signal")]
    pub trigger_signal: TriggerSignal,
    /// Append every capture to this CSV file
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    /// Issue receive and fire from two threads
    #[serde(default)]
    pub concurrent: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            master: default_master(),
            slave: default_slave(),
            channel: ChannelConfig::default(),
            stream: StreamConfig::default(),
            trigger_signal: default_trigger_signal(),
            csv_path: None,
            concurrent: false,
        }
    }
}

impl SessionConfig {
    /// Config file path: `<data_dir>/phasecollect/session.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("phasecollect")
            .join("session.json")
    }

    /// Load from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded session config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse session config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No session config found, using defaults");
                Self::default()
            }
        }
    }

    /// Save to `path`, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Session config saved");
        Ok(())
    }

    /// Static checks that need no hardware
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.master == self.slave {
            return Err(SamplerError::InvalidConfig(
                "master and slave must be different devices".into(),
            ));
        }
        self.stream.validate()
    }
}
