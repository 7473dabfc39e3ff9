//! # Modulation Tables
//!
//! The closed set of per-carrier modulation schemes and everything keyed on
//! them: bits per symbol, the closed-form BER model, the adaptive ladder
//! thresholds, and the transmit power recommendation.
//!
//! | Scheme | Bits | BER model                          | Default min SNR |
//! |--------|------|------------------------------------|-----------------|
//! | BPSK   | 1    | 0.5    · exp(−snr_lin)             | 0 dB            |
//! | QPSK   | 2    | 0.5    · exp(−snr_lin / 2)         | 7 dB            |
//! | 8PSK   | 3    | 0.5    · exp(−snr_lin / 3)         | 10 dB           |
//! | 16QAM  | 4    | 0.375  · exp(−snr_lin / 5)         | 14 dB           |
//! | 64QAM  | 6    | 0.4375 · exp(−snr_lin / 7)         | 20 dB           |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Per-carrier modulation scheme, ordered from most robust to densest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modulation {
    #[serde(rename = "BPSK")]
    Bpsk,
    #[serde(rename = "QPSK")]
    Qpsk,
    #[serde(rename = "8PSK")]
    Psk8,
    #[serde(rename = "16QAM")]
    Qam16,
    #[serde(rename = "64QAM")]
    Qam64,
}

impl Modulation {
    /// All schemes in ascending order of density.
    pub const ALL: [Modulation; 5] = [
        Modulation::Bpsk,
        Modulation::Qpsk,
        Modulation::Psk8,
        Modulation::Qam16,
        Modulation::Qam64,
    ];

    /// Bits carried per OFDM symbol on one carrier.
    pub fn bits_per_symbol(self) -> u32 {
        match self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Psk8 => 3,
            Modulation::Qam16 => 4,
            Modulation::Qam64 => 6,
        }
    }

    /// Canonical name, as used in config files and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Modulation::Bpsk => "BPSK",
            Modulation::Qpsk => "QPSK",
            Modulation::Psk8 => "8PSK",
            Modulation::Qam16 => "16QAM",
            Modulation::Qam64 => "64QAM",
        }
    }

    /// Approximate bit error rate at `snr_db` for this scheme.
    ///
    /// Closed-form exponential bounds rather than exact erfc curves; they
    /// are only used for relative link-quality telemetry.
    pub fn ber(self, snr_db: f64) -> f64 {
        let snr_lin = 10f64.powf(snr_db / 10.0);
        match self {
            Modulation::Bpsk => 0.5 * (-snr_lin).exp(),
            Modulation::Qpsk => 0.5 * (-snr_lin / 2.0).exp(),
            Modulation::Psk8 => 0.5 * (-snr_lin / 3.0).exp(),
            Modulation::Qam16 => 0.375 * (-snr_lin / 5.0).exp(),
            Modulation::Qam64 => 0.4375 * (-snr_lin / 7.0).exp(),
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown modulation {0:?}")]
pub struct ParseModulationError(pub String);

impl FromStr for Modulation {
    type Err = ParseModulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BPSK" => Ok(Modulation::Bpsk),
            "QPSK" => Ok(Modulation::Qpsk),
            "8PSK" => Ok(Modulation::Psk8),
            "16QAM" => Ok(Modulation::Qam16),
            "64QAM" => Ok(Modulation::Qam64),
            _ => Err(ParseModulationError(s.to_string())),
        }
    }
}

/// Minimum SNR (dB) at which each scheme may be selected.
///
/// Denser schemes must require strictly more SNR; see [`SnrThresholds::is_ascending`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrThresholds {
    pub bpsk: f64,
    pub qpsk: f64,
    pub psk8: f64,
    pub qam16: f64,
    pub qam64: f64,
}

impl Default for SnrThresholds {
    fn default() -> Self {
        SnrThresholds {
            bpsk: 0.0,
            qpsk: 7.0,
            psk8: 10.0,
            qam16: 14.0,
            qam64: 20.0,
        }
    }
}

impl SnrThresholds {
    pub fn get(&self, modulation: Modulation) -> f64 {
        match modulation {
            Modulation::Bpsk => self.bpsk,
            Modulation::Qpsk => self.qpsk,
            Modulation::Psk8 => self.psk8,
            Modulation::Qam16 => self.qam16,
            Modulation::Qam64 => self.qam64,
        }
    }

    pub fn set(&mut self, modulation: Modulation, snr_db: f64) {
        match modulation {
            Modulation::Bpsk => self.bpsk = snr_db,
            Modulation::Qpsk => self.qpsk = snr_db,
            Modulation::Psk8 => self.psk8 = snr_db,
            Modulation::Qam16 => self.qam16 = snr_db,
            Modulation::Qam64 => self.qam64 = snr_db,
        }
    }

    /// Densest scheme whose threshold is at or below `snr_db`.
    ///
    /// Scans from 64QAM downwards; falls back to BPSK when nothing qualifies.
    pub fn select(&self, snr_db: f64) -> Modulation {
        Modulation::ALL
            .iter()
            .rev()
            .copied()
            .find(|&m| self.get(m) <= snr_db)
            .unwrap_or(Modulation::Bpsk)
    }

    /// Whether every threshold is finite and strictly above the previous one.
    pub fn is_ascending(&self) -> bool {
        let values = Modulation::ALL.map(|m| self.get(m));
        values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[0] < w[1])
    }
}

/// Relative transmit power recommendation for a carrier at `snr_db`.
///
/// Backs power off as margin grows: floor 0.7, ceiling 1.0.
pub fn recommended_power(snr_db: f64) -> f64 {
    if snr_db > 25.0 {
        0.7
    } else if snr_db > 20.0 {
        0.8
    } else if snr_db > 15.0 {
        0.9
    } else {
        1.0
    }
}
