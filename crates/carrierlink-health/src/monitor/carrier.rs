//! Per-carrier health record and its bounded history.

use std::collections::VecDeque;

use serde::Serialize;

use crate::estimator::PILOT_SPACING;
use crate::modulation::Modulation;

/// Samples compared on each side of the trend split.
pub const TREND_WINDOW: usize = 10;
/// Mean SNR change (dB) between windows that counts as a trend.
pub const TREND_THRESHOLD_DB: f64 = 1.0;

const INITIAL_PILOT_SNR_DB: f64 = 30.0;
const INITIAL_DATA_SNR_DB: f64 = 15.0;

/// One tick's view of a carrier. Never modified after it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSample {
    pub timestamp_ms: u64,
    pub snr: f64,
    pub ber: f64,
    pub success_rate: f64,
}

impl HealthSample {
    pub fn new(timestamp_ms: u64, snr: f64, ber: f64) -> Self {
        Self {
            timestamp_ms,
            snr,
            ber,
            success_rate: 1.0 - ber,
        }
    }
}

/// Direction of a carrier's SNR over its recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierTrend {
    Improving,
    Stable,
    Degrading,
}

impl CarrierTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierTrend::Improving => "improving",
            CarrierTrend::Stable => "stable",
            CarrierTrend::Degrading => "degrading",
        }
    }
}

/// Authoritative health record for one OFDM subcarrier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Carrier {
    pub id: usize,
    /// Pilot carriers stay enabled whatever their SNR.
    pub is_pilot: bool,
    /// Latest SNR in dB, never negative.
    pub snr: f64,
    pub ber: f64,
    /// Recommended relative transmit power in (0, 1].
    pub power_level: f64,
    pub modulation: Modulation,
    pub capacity_bits_per_symbol: u32,
    pub enabled: bool,
    pub last_update_ms: u64,
    /// Oldest first.
    pub history: VecDeque<HealthSample>,
}

impl Carrier {
    pub fn is_pilot_id(id: usize) -> bool {
        id % PILOT_SPACING == 0
    }

    /// Fresh record as created when a modem is attached: QPSK, enabled,
    /// full power, optimistic starting SNR.
    pub fn new(id: usize, now_ms: u64) -> Self {
        let is_pilot = Self::is_pilot_id(id);
        let snr = if is_pilot {
            INITIAL_PILOT_SNR_DB
        } else {
            INITIAL_DATA_SNR_DB
        };
        let modulation = Modulation::Qpsk;
        Carrier {
            id,
            is_pilot,
            snr,
            ber: modulation.ber(snr),
            power_level: 1.0,
            modulation,
            capacity_bits_per_symbol: modulation.bits_per_symbol(),
            enabled: true,
            last_update_ms: now_ms,
            history: VecDeque::new(),
        }
    }

    pub(crate) fn set_modulation(&mut self, modulation: Modulation) {
        self.modulation = modulation;
        self.capacity_bits_per_symbol = modulation.bits_per_symbol();
    }

    /// Append `sample`, dropping the oldest entries beyond `limit`.
    pub(crate) fn record(&mut self, sample: HealthSample, limit: usize) {
        self.history.push_back(sample);
        self.truncate_history(limit);
    }

    pub(crate) fn truncate_history(&mut self, limit: usize) {
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    /// Compare mean SNR of the latest [`TREND_WINDOW`] samples against the
    /// window before it. Needs two full windows; otherwise `Stable`.
    pub fn trend(&self) -> CarrierTrend {
        let len = self.history.len();
        if len < 2 * TREND_WINDOW {
            return CarrierTrend::Stable;
        }
        let mean = |range: std::ops::Range<usize>| {
            self.history.range(range).map(|s| s.snr).sum::<f64>() / TREND_WINDOW as f64
        };
        let recent = mean(len - TREND_WINDOW..len);
        let prior = mean(len - 2 * TREND_WINDOW..len - TREND_WINDOW);
        let delta = recent - prior;

        if delta > TREND_THRESHOLD_DB {
            CarrierTrend::Improving
        } else if delta < -TREND_THRESHOLD_DB {
            CarrierTrend::Degrading
        } else {
            CarrierTrend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier_with_history(snrs: &[f64]) -> Carrier {
        let mut c = Carrier::new(1, 0);
        for (t, &snr) in snrs.iter().enumerate() {
            c.record(HealthSample::new(t as u64, snr, 0.0), 100);
        }
        c
    }

    #[test]
    fn new_carrier_defaults() {
        let pilot = Carrier::new(12, 5);
        assert!(pilot.is_pilot);
        assert_eq!(pilot.snr, 30.0);
        assert_eq!(pilot.modulation, Modulation::Qpsk);
        assert_eq!(pilot.capacity_bits_per_symbol, 2);
        assert!(pilot.enabled);
        assert_eq!(pilot.last_update_ms, 5);

        let data = Carrier::new(13, 5);
        assert!(!data.is_pilot);
        assert_eq!(data.snr, 15.0);
    }

    #[test]
    fn success_rate_complements_ber() {
        let s = HealthSample::new(0, 10.0, 0.25);
        assert_eq!(s.success_rate, 0.75);
    }

    #[test]
    fn record_evicts_oldest() {
        let mut c = Carrier::new(1, 0);
        for t in 0..8 {
            c.record(HealthSample::new(t, t as f64, 0.0), 5);
        }
        assert_eq!(c.history.len(), 5);
        assert_eq!(c.history.front().unwrap().timestamp_ms, 3);
        assert_eq!(c.history.back().unwrap().timestamp_ms, 7);
    }

    #[test]
    fn set_modulation_updates_capacity() {
        let mut c = Carrier::new(1, 0);
        c.set_modulation(Modulation::Qam64);
        assert_eq!(c.capacity_bits_per_symbol, 6);
    }

    // ─── Trend ──────────────────────────────────────────────────────────

    #[test]
    fn trend_needs_two_windows() {
        assert_eq!(carrier_with_history(&[]).trend(), CarrierTrend::Stable);
        let rising: Vec<f64> = (0..19).map(|i| i as f64 * 3.0).collect();
        assert_eq!(carrier_with_history(&rising).trend(), CarrierTrend::Stable);
    }

    #[test]
    fn trend_improving() {
        let mut snrs = vec![10.0; 10];
        snrs.extend(vec![15.0; 10]);
        assert_eq!(carrier_with_history(&snrs).trend(), CarrierTrend::Improving);
    }

    #[test]
    fn trend_degrading() {
        let mut snrs = vec![15.0; 10];
        snrs.extend(vec![10.0; 10]);
        assert_eq!(carrier_with_history(&snrs).trend(), CarrierTrend::Degrading);
    }

    #[test]
    fn trend_within_one_db_is_stable() {
        let mut snrs = vec![10.0; 10];
        snrs.extend(vec![10.9; 10]);
        assert_eq!(carrier_with_history(&snrs).trend(), CarrierTrend::Stable);
    }

    #[test]
    fn trend_uses_latest_windows_only() {
        // Old data far lower; last two windows flat.
        let mut snrs = vec![0.0; 30];
        snrs.extend(vec![20.0; 20]);
        assert_eq!(carrier_with_history(&snrs).trend(), CarrierTrend::Stable);
    }
}
