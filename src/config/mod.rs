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
//! Handles loading and saving bed settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::config::BACKOFF_FACTOR;
use crate::commands::{RepeatPolicy, Side};
use crate::protocol::ProtocolId;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configured beds.
    #[serde(default)]
    pub beds: Vec<BedConfig>,

    /// Raw frame capture.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Settings for one bed. Immutable once handed to a coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedConfig {
    /// Bluetooth address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub address: String,

    /// Advertised name, used for protocol detection.
    #[serde(default)]
    pub name: Option<String>,

    /// Manual protocol selection; overrides detection.
    #[serde(default)]
    pub protocol: Option<ProtocolId>,

    #[serde(default = "default_motor_count")]
    pub motor_count: u8,

    /// Which half of a split base to drive.
    #[serde(default)]
    pub side: Side,

    /// PIN for PIN-gated protocols.
    #[serde(default)]
    pub pin: Option<String>,

    /// Reconnect after unexpected link loss.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_motor_count() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

impl BedConfig {
    pub fn new(address: impl Into<String>, protocol: ProtocolId) -> Self {
        Self {
            protocol: Some(protocol),
            ..Self::undetected(address)
        }
    }

    /// A bed whose protocol still has to be detected.
    pub fn undetected(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            protocol: None,
            motor_count: default_motor_count(),
            side: Side::Both,
            pin: None,
            auto_reconnect: true,
            timing: TimingConfig::default(),
        }
    }
}

/// Timing knobs. All durations are stored as plain integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Packets per held motor move.
    pub motor_pulse_count: u32,
    pub motor_pulse_delay_ms: u64,
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub write_timeout_ms: u64,
    /// Tries per packet before a write timeout is reported.
    pub write_attempts: u32,
    pub max_connect_attempts: u32,
    /// First retry delay; later retries grow by 1.5x.
    pub retry_base_delay_ms: u64,
    pub position_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            motor_pulse_count: 10,
            motor_pulse_delay_ms: 100,
            idle_timeout_secs: 40,
            connect_timeout_secs: 20,
            write_timeout_ms: 5000,
            write_attempts: 2,
            max_connect_attempts: 3,
            retry_base_delay_ms: 5000,
            position_timeout_ms: 3000,
        }
    }
}

impl TimingConfig {
    pub fn motor_repeat(&self) -> RepeatPolicy {
        RepeatPolicy::held(self.motor_pulse_count.max(1), self.motor_pulse_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn position_timeout(&self) -> Duration {
        Duration::from_millis(self.position_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = BACKOFF_FACTOR.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.retry_base_delay_ms as f64 * factor) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Record raw frames.
    pub enabled: bool,

    /// Maximum number of frames kept.
    pub capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 256,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/bedlink/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bedlink")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Settings for the bed at `address` (case-insensitive).
    pub fn bed(&self, address: &str) -> Option<&BedConfig> {
        self.beds
            .iter()
            .find(|bed| bed.address.eq_ignore_ascii_case(address))
    }
}
