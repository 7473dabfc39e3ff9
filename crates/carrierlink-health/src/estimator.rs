//! # Signal Quality Estimation
//!
//! Per-carrier SNR from received complex baseband samples. The estimation
//! path is chosen by the carrier's role:
//!
//! - **Pilot** carriers transmit a BPSK symbol fixed at construction, so the
//!   error against that symbol is the noise.
//! - **Data-aided**: the caller knows which symbol was sent and passes it in.
//! - **Blind** (M2M4): second and fourth moments of the centered samples.
//!
//! $$\kappa = \frac{M_4}{M_2^2}, \qquad N = \left| M_2 \cdot \frac{\kappa - 2}{2} \right|, \qquad S = M_2$$
//!
//! Zero-noise results saturate at a ceiling instead of returning infinity:
//! 40 dB for pilot and data-aided estimates, 30 dB for blind ones.

use std::collections::{HashMap, VecDeque};

use num_complex::Complex64;
use thiserror::Error;
use tracing::debug;

/// Spacing of pilot carriers across the band.
pub const PILOT_SPACING: usize = 6;
/// Samples retained per carrier for [`SignalQualityEstimator::averaged_snr`].
pub const SAMPLE_BUFFER_CAPACITY: usize = 100;
/// Ceiling for pilot and data-aided estimates when noise vanishes.
pub const REFERENCE_CEILING_DB: f64 = 40.0;
/// Ceiling for blind estimates when noise vanishes.
pub const BLIND_CEILING_DB: f64 = 30.0;
/// Noise floor reported before any quiet-period measurement.
pub const DEFAULT_NOISE_FLOOR_DBM: f64 = -100.0;

const NOISE_EPSILON: f64 = 1e-10;
/// Kurtosis assumed for the transmitted constellation in blind mode.
/// Holds for equal-energy (QPSK-like) constellations only.
const BLIND_REFERENCE_KURTOSIS: f64 = 2.0;
/// Lower edges of CQI 1..=15 in dB.
const CQI_THRESHOLDS_DB: [f64; 15] = [
    -6.0, -4.0, -2.0, 0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimatorError {
    #[error("no samples supplied for estimation")]
    InsufficientData,
    #[error("known symbol has no energy to correlate against")]
    ZeroEnergySymbol,
    #[error("quiet samples carry no power; noise floor is unmeasurable")]
    SilentInput,
}

/// One received complex baseband sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSample {
    pub iq: Complex64,
    /// Capture time in milliseconds.
    pub timestamp_ms: u64,
}

impl SignalSample {
    pub fn new(real: f64, imag: f64, timestamp_ms: u64) -> Self {
        Self {
            iq: Complex64::new(real, imag),
            timestamp_ms,
        }
    }
}

/// Noise statistics produced by the blind path.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoiseEstimate {
    /// Estimated noise power (linear).
    pub power: f64,
    /// Variance of the centered samples (M2).
    pub variance: f64,
    /// Noise power per bin of an N-point transform of the block.
    pub spectral_density: f64,
}

/// Detailed result of a blind estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlindEstimate {
    pub snr_db: f64,
    pub signal_power: f64,
    pub kurtosis: f64,
    pub noise: NoiseEstimate,
}

/// Which reference an estimate was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationMode {
    Pilot,
    DataAided,
    Blind,
}

/// SNR estimator holding pilot symbols, per-carrier sample buffers, and the
/// last measured noise floor.
#[derive(Debug, Clone)]
pub struct SignalQualityEstimator {
    pilots: HashMap<usize, Complex64>,
    buffers: HashMap<usize, VecDeque<SignalSample>>,
    noise_floor_dbm: f64,
}

impl SignalQualityEstimator {
    /// Registers a pilot on every [`PILOT_SPACING`]th carrier below `carrier_count`.
    ///
    /// Pilot symbols alternate: +1 where `id % 12 == 0`, −1 otherwise.
    pub fn new(carrier_count: usize) -> Self {
        let pilots = (0..carrier_count)
            .step_by(PILOT_SPACING)
            .map(|id| {
                let re = if id % (2 * PILOT_SPACING) == 0 { 1.0 } else { -1.0 };
                (id, Complex64::new(re, 0.0))
            })
            .collect();
        Self {
            pilots,
            buffers: HashMap::new(),
            noise_floor_dbm: DEFAULT_NOISE_FLOOR_DBM,
        }
    }

    pub fn is_pilot(&self, carrier_id: usize) -> bool {
        self.pilots.contains_key(&carrier_id)
    }

    pub fn pilot_symbol(&self, carrier_id: usize) -> Option<Complex64> {
        self.pilots.get(&carrier_id).copied()
    }

    /// Estimation path that [`estimate_snr`](Self::estimate_snr) would take.
    pub fn mode_for(&self, carrier_id: usize, known_symbol: Option<Complex64>) -> EstimationMode {
        if self.is_pilot(carrier_id) {
            EstimationMode::Pilot
        } else if known_symbol.is_some() {
            EstimationMode::DataAided
        } else {
            EstimationMode::Blind
        }
    }

    /// Estimate the SNR (dB) of `carrier_id` from `samples`.
    ///
    /// Blind estimates also feed the carrier's sample buffer.
    pub fn estimate_snr(
        &mut self,
        carrier_id: usize,
        samples: &[SignalSample],
        known_symbol: Option<Complex64>,
    ) -> Result<f64, EstimatorError> {
        if samples.is_empty() {
            return Err(EstimatorError::InsufficientData);
        }

        let mode = self.mode_for(carrier_id, known_symbol);
        let snr_db = if let Some(pilot) = self.pilot_symbol(carrier_id) {
            pilot_snr(samples, pilot)
        } else if let Some(symbol) = known_symbol {
            if symbol.norm_sqr() < NOISE_EPSILON {
                return Err(EstimatorError::ZeroEnergySymbol);
            }
            data_aided_snr(samples, symbol)
        } else {
            let estimate = Self::estimate_blind(samples)?;
            self.buffer_samples(carrier_id, samples);
            estimate.snr_db
        };

        debug!(carrier_id, ?mode, snr_db, samples = samples.len(), "snr estimate");
        Ok(snr_db)
    }

    /// M2M4 blind estimate over `samples`.
    pub fn estimate_blind(samples: &[SignalSample]) -> Result<BlindEstimate, EstimatorError> {
        if samples.is_empty() {
            return Err(EstimatorError::InsufficientData);
        }
        let n = samples.len() as f64;

        let mean = samples.iter().map(|s| s.iq).sum::<Complex64>() / n;
        let (sum2, sum4) = samples.iter().fold((0.0, 0.0), |(m2, m4), s| {
            let p = (s.iq - mean).norm_sqr();
            (m2 + p, m4 + p * p)
        });
        let m2 = sum2 / n;
        let m4 = sum4 / n;

        let kurtosis = m4 / (m2 * m2);
        let noise_power = if kurtosis.is_finite() {
            (m2 * (kurtosis - BLIND_REFERENCE_KURTOSIS) / 2.0).abs()
        } else {
            // Zero-variance block: no spread at all, so no measurable noise.
            0.0
        };
        let signal_power = m2;

        let snr_db = if noise_power < NOISE_EPSILON {
            BLIND_CEILING_DB
        } else {
            10.0 * (signal_power / noise_power).log10()
        };

        Ok(BlindEstimate {
            snr_db,
            signal_power,
            kurtosis,
            noise: NoiseEstimate {
                power: noise_power,
                variance: m2,
                spectral_density: noise_power / n,
            },
        })
    }

    /// Measure the noise floor (dBm, 50 Ω reference) from samples taken
    /// while nothing is transmitting. The result is also stored.
    ///
    /// All-zero input has no finite floor and leaves the stored value alone.
    pub fn estimate_noise_floor(
        &mut self,
        quiet_samples: &[SignalSample],
    ) -> Result<f64, EstimatorError> {
        if quiet_samples.is_empty() {
            return Err(EstimatorError::InsufficientData);
        }
        let avg_power =
            quiet_samples.iter().map(|s| s.iq.norm_sqr()).sum::<f64>() / quiet_samples.len() as f64;
        if avg_power < NOISE_EPSILON * NOISE_EPSILON {
            return Err(EstimatorError::SilentInput);
        }
        self.noise_floor_dbm = 10.0 * (avg_power * 1000.0).log10();
        Ok(self.noise_floor_dbm)
    }

    pub fn noise_floor_dbm(&self) -> f64 {
        self.noise_floor_dbm
    }

    /// Blind estimate over everything buffered for `carrier_id`; 0 dB when empty.
    pub fn averaged_snr(&self, carrier_id: usize) -> f64 {
        let Some(buffer) = self.buffers.get(&carrier_id) else {
            return 0.0;
        };
        let samples: Vec<SignalSample> = buffer.iter().copied().collect();
        Self::estimate_blind(&samples)
            .map(|e| e.snr_db)
            .unwrap_or(0.0)
    }

    pub fn buffered_samples(&self, carrier_id: usize) -> usize {
        self.buffers.get(&carrier_id).map_or(0, VecDeque::len)
    }

    /// Drop all buffered samples and forget the noise floor.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.noise_floor_dbm = DEFAULT_NOISE_FLOOR_DBM;
    }

    fn buffer_samples(&mut self, carrier_id: usize, samples: &[SignalSample]) {
        let buffer = self
            .buffers
            .entry(carrier_id)
            .or_insert_with(|| VecDeque::with_capacity(SAMPLE_BUFFER_CAPACITY));
        for &sample in samples {
            if buffer.len() == SAMPLE_BUFFER_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(sample);
        }
    }
}

/// Map SNR (dB) to a 0–15 channel quality indicator in 2 dB steps.
pub fn estimate_cqi(snr_db: f64) -> u8 {
    CQI_THRESHOLDS_DB
        .iter()
        .position(|&threshold| snr_db < threshold)
        .unwrap_or(CQI_THRESHOLDS_DB.len()) as u8
}

fn pilot_snr(samples: &[SignalSample], pilot: Complex64) -> f64 {
    let n = samples.len() as f64;
    let signal_power = pilot.norm_sqr();
    let noise_power = samples.iter().map(|s| (s.iq - pilot).norm_sqr()).sum::<f64>() / n;
    ratio_db(signal_power, noise_power, REFERENCE_CEILING_DB)
}

fn data_aided_snr(samples: &[SignalSample], symbol: Complex64) -> f64 {
    let n = samples.len() as f64;
    let total_power = samples.iter().map(|s| s.iq.norm_sqr()).sum::<f64>() / n;
    let correlation = samples.iter().map(|s| (s.iq * symbol.conj()).norm()).sum::<f64>() / n;
    ratio_db(correlation, total_power - correlation, REFERENCE_CEILING_DB)
}

fn ratio_db(signal_power: f64, noise_power: f64, ceiling_db: f64) -> f64 {
    if noise_power < NOISE_EPSILON {
        ceiling_db
    } else {
        10.0 * (signal_power / noise_power).log10()
    }
}
