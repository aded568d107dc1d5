// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::link::{LinkSettings, TieBreak, DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_QUEUE_DEPTH};
use crate::transport::rfcomm::DEFAULT_RFCOMM_CHANNEL;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Link settings.
    pub link: LinkConfig,

    /// Chat settings.
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Bluetooth alias advertised while listening.
    pub device_name: String,

    /// RFCOMM channel the service listens on and dials.
    pub rfcomm_channel: u8,

    /// Listen again after a failed connect or a lost link.
    pub relisten_on_failure: bool,

    /// Winner when an inbound connection races an outbound attempt.
    pub tie_break: TieBreak,

    /// Give up on outbound attempts after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    /// Read buffer size in bytes.
    pub read_buffer_size: usize,

    /// Outbound messages that may queue before sends are refused.
    pub write_queue_depth: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_name: "MeshMessenger".to_string(),
            rfcomm_channel: DEFAULT_RFCOMM_CHANNEL,
            relisten_on_failure: true,
            tie_break: TieBreak::default(),
            connect_timeout_secs: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}

impl LinkConfig {
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            relisten_on_failure: self.relisten_on_failure,
            tie_break: self.tie_break,
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            read_buffer_size: self.read_buffer_size,
            write_queue_depth: self.write_queue_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Acknowledge received messages and track delivery of sent ones.
    pub ack_enabled: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { ack_enabled: true }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meshlink")
            .join("config.toml")
    }

    /// Load configuration from the default file or create it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[link]\nrfcomm_channel = 3\ntie_break = \"prefer_outbound\"\nconnect_timeout_secs = 15\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.link.rfcomm_channel, 3);
        assert_eq!(config.link.device_name, "MeshMessenger");
        assert!(config.chat.ack_enabled);

        let settings = config.link.settings();
        assert_eq!(settings.tie_break, TieBreak::PreferOutbound);
        assert_eq!(settings.connect_timeout, Some(Duration::from_secs(15)));
        assert!(settings.relisten_on_failure);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[link]\nrfcomm_channel = \"one\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
