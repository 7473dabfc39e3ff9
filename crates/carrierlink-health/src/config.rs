use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modulation::{Modulation, SnrThresholds};

pub const DEFAULT_CARRIER_COUNT: usize = 48;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_snr must be a non-negative finite dB value, got {0}")]
    InvalidMinSnr(f64),
    #[error("snr thresholds must be finite and strictly ascending from BPSK to 64QAM")]
    ThresholdsNotAscending,
    #[error("history_size must be at least 1")]
    ZeroHistorySize,
    #[error("sample_interval_ms must be at least 1")]
    ZeroInterval,
    #[error("carrier_count must be at least 1")]
    ZeroCarriers,
    #[error("jitter_db must be a non-negative finite dB value, got {0}")]
    InvalidJitter(f64),
    #[error("invalid config TOML: {0}")]
    Toml(String),
}

/// Partial configuration, as read from TOML or passed to
/// [`update_config`](crate::monitor::CarrierHealthMonitor::update_config).
///
/// Every field is optional; absent fields keep the value they are merged onto.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfigInput {
    pub sample_interval_ms: Option<u64>,
    pub history_size: Option<usize>,
    pub min_snr: Option<f64>,
    pub adaptive_modulation: Option<bool>,
    pub carrier_count: Option<usize>,
    pub jitter_db: Option<f64>,
    pub thresholds: ThresholdsInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ThresholdsInput {
    #[serde(rename = "BPSK")]
    pub bpsk: Option<f64>,
    #[serde(rename = "QPSK")]
    pub qpsk: Option<f64>,
    #[serde(rename = "8PSK")]
    pub psk8: Option<f64>,
    #[serde(rename = "16QAM")]
    pub qam16: Option<f64>,
    #[serde(rename = "64QAM")]
    pub qam64: Option<f64>,
}

impl ThresholdsInput {
    /// Override for `modulation`, if one was given.
    pub fn get(&self, modulation: Modulation) -> Option<f64> {
        match modulation {
            Modulation::Bpsk => self.bpsk,
            Modulation::Qpsk => self.qpsk,
            Modulation::Psk8 => self.psk8,
            Modulation::Qam16 => self.qam16,
            Modulation::Qam64 => self.qam64,
        }
    }
}

/// Active policy for the carrier health monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorConfig {
    /// Period of the control loop.
    pub sample_interval: Duration,
    /// Health samples retained per carrier.
    pub history_size: usize,
    pub snr_thresholds: SnrThresholds,
    /// Data carriers below this SNR (dB) are disabled.
    pub min_snr: f64,
    pub adaptive_modulation_enabled: bool,
    /// Number of carriers created when a modem is attached.
    pub carrier_count: usize,
    /// Amplitude of the default measurement jitter source (± dB).
    pub jitter_db: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(1000),
            history_size: 100,
            snr_thresholds: SnrThresholds::default(),
            min_snr: 3.0,
            adaptive_modulation_enabled: true,
            carrier_count: DEFAULT_CARRIER_COUNT,
            jitter_db: 1.0,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_snr.is_finite() || self.min_snr < 0.0 {
            return Err(ConfigError::InvalidMinSnr(self.min_snr));
        }
        if !self.snr_thresholds.is_ascending() {
            return Err(ConfigError::ThresholdsNotAscending);
        }
        if self.history_size == 0 {
            return Err(ConfigError::ZeroHistorySize);
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.carrier_count == 0 {
            return Err(ConfigError::ZeroCarriers);
        }
        if !self.jitter_db.is_finite() || self.jitter_db < 0.0 {
            return Err(ConfigError::InvalidJitter(self.jitter_db));
        }
        Ok(())
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(MonitorConfig::default());
        }
        let parsed: MonitorConfigInput =
            toml::from_str(input).map_err(|e| ConfigError::Toml(e.to_string()))?;
        parsed.resolve()
    }
}

impl MonitorConfigInput {
    /// Resolve against the defaults.
    pub fn resolve(self) -> Result<MonitorConfig, ConfigError> {
        self.merge_onto(&MonitorConfig::default())
    }

    /// Overlay the present fields onto `base` and validate the result.
    ///
    /// `base` is never modified; on error the caller keeps its old config.
    pub fn merge_onto(&self, base: &MonitorConfig) -> Result<MonitorConfig, ConfigError> {
        let mut thresholds = base.snr_thresholds;
        for modulation in Modulation::ALL {
            if let Some(v) = self.thresholds.get(modulation) {
                thresholds.set(modulation, v);
            }
        }

        let merged = MonitorConfig {
            sample_interval: self
                .sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(base.sample_interval),
            history_size: self.history_size.unwrap_or(base.history_size),
            snr_thresholds: thresholds,
            min_snr: self.min_snr.unwrap_or(base.min_snr),
            adaptive_modulation_enabled: self
                .adaptive_modulation
                .unwrap_or(base.adaptive_modulation_enabled),
            carrier_count: self.carrier_count.unwrap_or(base.carrier_count),
            jitter_db: self.jitter_db.unwrap_or(base.jitter_db),
        };
        merged.validate()?;
        Ok(merged)
    }
}
