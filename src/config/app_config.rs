// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application configuration (buffer sizing, transfer driver, posting).

use serde::{Deserialize, Serialize};

/// Ring buffer sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Total byte slots; one is always kept free.
    pub capacity: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Producer/consumer transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Bytes to move before stopping.
    pub total_bytes: u64,
    /// Largest chunk either side transfers at once.
    pub max_chunk: usize,
    /// Seed for chunk sizes. Random when unset.
    pub seed: Option<u64>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            total_bytes: 1 << 20,
            max_chunk: 512,
            seed: None,
        }
    }
}

/// Where posted console text goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostConfig {
    /// Write posts to stderr instead of the host console.
    pub print_to_stderr: bool,
    /// Highest verbose level that is shown.
    pub verbosity: u8,
    /// Route posts into the log when not printing to stderr.
    pub forward_to_tracing: bool,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            print_to_stderr: true,
            verbosity: 0,
            forward_to_tracing: false,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub pump: PumpConfig,
    #[serde(default)]
    pub post: PostConfig,
}

impl AppConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
