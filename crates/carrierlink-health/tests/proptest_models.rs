//! Property-based tests for the link models: CQI mapping, BER curves,
//! the modulation ladder and the monitor's SNR clamp.

use carrierlink_health::config::MonitorConfig;
use carrierlink_health::estimator::{SignalQualityEstimator, SignalSample, estimate_cqi};
use carrierlink_health::modem::{CarrierStatus, Modem, ModemError};
use carrierlink_health::modulation::{Modulation, SnrThresholds, recommended_power};
use carrierlink_health::monitor::{CarrierHealthMonitor, ConstantJitter};
use proptest::prelude::*;

fn any_modulation() -> impl Strategy<Value = Modulation> {
    prop::sample::select(Modulation::ALL.to_vec())
}

// ─── CQI ─────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn cqi_in_range(snr in -50.0f64..80.0) {
        prop_assert!(estimate_cqi(snr) <= 15);
    }

    #[test]
    fn cqi_monotonic(a in -50.0f64..80.0, b in -50.0f64..80.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(estimate_cqi(lo) <= estimate_cqi(hi));
    }
}

// ─── BER Models ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn ber_is_a_probability(m in any_modulation(), snr in 0.0f64..60.0) {
        let ber = m.ber(snr);
        prop_assert!((0.0..=1.0).contains(&ber), "{} at {} dB: {}", m, snr, ber);
    }

    #[test]
    fn ber_non_increasing_in_snr(m in any_modulation(), a in 0.0f64..40.0, delta in 0.0f64..10.0) {
        prop_assert!(m.ber(a + delta) <= m.ber(a) + 1e-15);
    }
}

// ─── Ladder & Power ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn ladder_monotonic_in_snr(a in -10.0f64..50.0, b in -10.0f64..50.0) {
        let thresholds = SnrThresholds::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.select(lo) <= thresholds.select(hi));
    }

    #[test]
    fn ladder_choice_meets_its_threshold(snr in 0.0f64..50.0) {
        let thresholds = SnrThresholds::default();
        let m = thresholds.select(snr);
        prop_assert!(thresholds.get(m) <= snr);
    }

    #[test]
    fn power_stays_in_bounds_and_backs_off(a in 0.0f64..50.0, b in 0.0f64..50.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let p = recommended_power(lo);
        prop_assert!((0.7..=1.0).contains(&p));
        prop_assert!(recommended_power(hi) <= p);
    }
}

// ─── Estimator ───────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn blind_estimate_is_finite(iq in prop::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 1..200)) {
        let samples: Vec<SignalSample> = iq
            .iter()
            .enumerate()
            .map(|(t, &(re, im))| SignalSample::new(re, im, t as u64))
            .collect();
        let estimate = SignalQualityEstimator::estimate_blind(&samples).unwrap();
        prop_assert!(estimate.snr_db.is_finite());
        prop_assert!(estimate.noise.power >= 0.0);
    }

    #[test]
    fn sample_buffer_is_bounded(batches in prop::collection::vec(1usize..60, 1..10)) {
        let mut est = SignalQualityEstimator::new(12);
        let mut t = 0u64;
        for len in batches {
            let samples: Vec<SignalSample> = (0..len)
                .map(|i| {
                    t += 1;
                    SignalSample::new(if i % 2 == 0 { 1.0 } else { -1.0 }, 0.1, t)
                })
                .collect();
            est.estimate_snr(1, &samples, None).unwrap();
            prop_assert!(est.buffered_samples(1) <= 100);
        }
    }
}

// ─── Monitor Clamp ───────────────────────────────────────────────────────────

struct FixedModem(f64);

impl Modem for FixedModem {
    fn carrier_status(&mut self) -> Vec<CarrierStatus> {
        vec![CarrierStatus { snr: self.0 }; 12]
    }
    fn set_carrier_modulation(&mut self, _: usize, _: Modulation) -> Result<(), ModemError> {
        Ok(())
    }
    fn set_carrier_enabled(&mut self, _: usize, _: bool) -> Result<(), ModemError> {
        Ok(())
    }
}

proptest! {
    #[test]
    fn stored_snr_never_negative(reported in -30.0f64..40.0, jitter in -5.0f64..5.0) {
        let config = MonitorConfig { carrier_count: 12, ..Default::default() };
        let mut monitor =
            CarrierHealthMonitor::with_jitter(config, Box::new(ConstantJitter(jitter))).unwrap();
        monitor.initialize(FixedModem(reported));
        monitor.tick_at(1).unwrap();
        for c in monitor.all_carrier_health() {
            prop_assert!(c.snr >= 0.0);
            prop_assert!((c.snr - (reported + jitter).max(0.0)).abs() < 1e-12);
            prop_assert!(c.is_pilot || c.enabled == (c.snr >= 3.0));
            prop_assert!(!c.is_pilot || c.enabled);
        }
    }
}
