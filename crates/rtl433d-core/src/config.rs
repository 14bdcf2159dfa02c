//! Bridge configuration and the protocol allow-list.
//!
//! Configuration arrives from the CLI or a TOML file, is validated once at
//! setup, and is immutable afterwards. Validation failures are hard errors:
//! an unknown model in the protocol filter blocks setup entirely rather than
//! being silently ignored.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema;

/// Default capture frequency for the 433 MHz ISM band.
pub const DEFAULT_FREQUENCY: &str = "433.92M";

/// Default tuner gain.
pub const DEFAULT_GAIN: u32 = 40;

/// Default RTL-SDR device index.
pub const DEFAULT_DEVICE_ID: &str = "0";

// =============================================================================
// BridgeConfig
// =============================================================================

/// User-facing configuration for one bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// RTL-SDR device index as a numeric string (e.g. `"0"`).
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Center frequency, digits with optional decimal part and `M` suffix.
    #[serde(default = "default_frequency")]
    pub frequency: String,

    /// Tuner gain, 0..=50.
    #[serde(default = "default_gain")]
    pub gain: u32,

    /// Model names to allow; empty means all supported models.
    #[serde(default)]
    pub protocol_filter: Vec<String>,
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

fn default_frequency() -> String {
    DEFAULT_FREQUENCY.to_string()
}

fn default_gain() -> u32 {
    DEFAULT_GAIN
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            frequency: default_frequency(),
            gain: default_gain(),
            protocol_filter: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Validate all fields and construct the protocol filter.
    ///
    /// This is the fail-fast step: any error here blocks setup with an
    /// actionable message and is never retried.
    pub fn validate(&self) -> Result<Option<ProtocolFilter>, ConfigError> {
        // Patterns are fixed literals; compilation cannot fail at runtime.
        #[allow(clippy::unwrap_used)]
        let device_re = Regex::new(r"^\d+$").unwrap();
        #[allow(clippy::unwrap_used)]
        let freq_re = Regex::new(r"^\d+(\.\d+)?M?$").unwrap();

        if !device_re.is_match(&self.device_id) {
            return Err(ConfigError::InvalidDeviceId(self.device_id.clone()));
        }
        if !freq_re.is_match(&self.frequency) {
            return Err(ConfigError::InvalidFrequency(self.frequency.clone()));
        }
        if self.gain > 50 {
            return Err(ConfigError::InvalidGain(self.gain));
        }

        if self.protocol_filter.is_empty() {
            Ok(None)
        } else {
            ProtocolFilter::new(self.protocol_filter.iter().cloned()).map(Some)
        }
    }

    /// Parse a comma-separated allow-list into `protocol_filter` entries.
    ///
    /// Blank segments are dropped; validation of the names happens in
    /// [`validate`](Self::validate).
    pub fn set_protocols_from_str(&mut self, raw: &str) {
        self.protocol_filter = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
}

// =============================================================================
// ProtocolFilter
// =============================================================================

/// Immutable set of allowed model names.
///
/// Constructed once at startup; every entry is checked against the model
/// schema registry so a typo in the allow-list fails setup instead of
/// silently dropping all traffic.
#[derive(Debug, Clone)]
pub struct ProtocolFilter {
    allowed: HashSet<String>,
}

impl ProtocolFilter {
    /// Build a filter from model names, rejecting unknown entries.
    pub fn new<I>(models: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut allowed = HashSet::new();
        for entry in models {
            if !schema::is_known_model(&entry) {
                return Err(ConfigError::UnknownProtocol { entry });
            }
            allowed.insert(entry);
        }
        Ok(Self { allowed })
    }

    /// Whether records for `model` pass the filter.
    pub fn allows(&self, model: &str) -> bool {
        self.allowed.contains(model)
    }

    /// The allowed model names.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}
