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
use bluer::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::{DEFAULT_NAME_FILTER, DEFAULT_TARGET_ADDRESS};
use crate::bluetooth::TargetFilter;

const APP_DIR: &str = "reflex-link";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the history database.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// History settings.
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter to use, e.g. "hci0". Empty selects the default adapter.
    pub adapter: String,

    /// Address of the micro:bit. Empty matches by name only.
    pub target_address: String,

    /// Substring of the advertised name that identifies the micro:bit.
    pub name_filter: String,

    /// Rescan after the peripheral drops the link.
    pub auto_reconnect: bool,

    /// Delay before such a rescan.
    pub rescan_delay_ms: u64,

    /// How long to wait for GATT services to resolve after connecting.
    pub services_timeout_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: String::new(),
            target_address: DEFAULT_TARGET_ADDRESS.to_string(),
            name_filter: DEFAULT_NAME_FILTER.to_string(),
            auto_reconnect: true,
            rescan_delay_ms: 2000,
            services_timeout_ms: 5000,
        }
    }
}

impl BluetoothConfig {
    /// Build the scan filter.
    pub fn target_filter(&self) -> Result<TargetFilter> {
        let address = match self.target_address.trim() {
            "" => None,
            text => Some(
                text.parse::<Address>()
                    .with_context(|| format!("invalid target_address {:?}", text))?,
            ),
        };
        Ok(TargetFilter {
            address,
            name_fragment: self.name_filter.clone(),
        })
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_millis(self.rescan_delay_ms)
    }

    pub fn services_timeout(&self) -> Duration {
        Duration::from_millis(self.services_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Persist reaction times and memory scores.
    pub enabled: bool,

    /// Rows kept per table.
    pub max_entries: u32,

    /// Rows shown by the `history` command.
    pub recent_limit: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
            recent_limit: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bluetooth: BluetoothConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

impl Config {
    /// Load configuration from the user config directory or create default.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&default_config_path())?;

        config.data_dir = default_data_dir();
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
