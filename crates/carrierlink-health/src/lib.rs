//! # carrierlink-health
//!
//! Carrier health and adaptive modulation for a multi-carrier (OFDM)
//! amateur-radio data link.
//!
//! ## Crate structure
//!
//! - [`estimator`]: Pilot, data-aided and blind (M2M4) SNR estimation, noise floor, CQI
//! - [`modulation`]: Modulation schemes, BER models, ladder thresholds, power policy
//! - [`monitor`]: Per-carrier health records and the adaptive control loop
//! - [`modem`]: Boundary trait for the physical modem
//! - [`config`]: Monitor policy, TOML loading and validation
//! - [`runtime`]: Background worker that ticks the monitor on its interval
//! - [`metrics`]: Prometheus and JSON exposition of carrier health

pub mod config;
pub mod estimator;
pub mod metrics;
pub mod modem;
pub mod modulation;
pub mod monitor;
pub mod runtime;

/// Milliseconds since the Unix epoch, used to stamp health samples.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
