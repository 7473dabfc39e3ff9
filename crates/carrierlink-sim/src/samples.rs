//! I/Q sample synthesis for exercising the SNR estimators.
//!
//! Constellations are normalised to unit average symbol energy, so the
//! complex AWGN variance is simply `10^(-snr_db / 10)`.

use std::f64::consts::PI;

use num_complex::Complex64;
use rand::RngExt as _;
use rand::rngs::StdRng;

use carrierlink_health::estimator::SignalSample;
use carrierlink_health::modulation::Modulation;

/// Constellation points of `modulation`, unit average energy.
pub fn constellation(modulation: Modulation) -> Vec<Complex64> {
    match modulation {
        Modulation::Bpsk => psk(2, 0.0),
        Modulation::Qpsk => psk(4, PI / 4.0),
        Modulation::Psk8 => psk(8, 0.0),
        Modulation::Qam16 => square_qam(4),
        Modulation::Qam64 => square_qam(8),
    }
}

fn psk(order: usize, offset: f64) -> Vec<Complex64> {
    (0..order)
        .map(|k| Complex64::from_polar(1.0, offset + 2.0 * PI * k as f64 / order as f64))
        .collect()
}

fn square_qam(side: usize) -> Vec<Complex64> {
    let levels: Vec<f64> = (0..side).map(|k| 2.0 * k as f64 - (side - 1) as f64).collect();
    let points: Vec<Complex64> = levels
        .iter()
        .flat_map(|&i| levels.iter().map(move |&q| Complex64::new(i, q)))
        .collect();
    let energy = points.iter().map(|p| p.norm_sqr()).sum::<f64>() / points.len() as f64;
    let scale = energy.sqrt();
    points.into_iter().map(|p| p / scale).collect()
}

/// Circular complex Gaussian noise with total variance `variance`.
pub fn awgn(rng: &mut StdRng, variance: f64) -> Complex64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1].
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    let radius = (-variance * u1.ln()).sqrt();
    Complex64::from_polar(radius, 2.0 * PI * u2)
}

/// `count` random symbols of `modulation` with AWGN at `snr_db`.
///
/// Timestamps run from `start_ms` in 1 ms steps.
pub fn synthesize_samples(
    rng: &mut StdRng,
    modulation: Modulation,
    count: usize,
    snr_db: f64,
    start_ms: u64,
) -> Vec<SignalSample> {
    let points = constellation(modulation);
    let variance = noise_variance(snr_db);
    (0..count)
        .map(|i| {
            let symbol = points[rng.random_range(0..points.len())];
            SignalSample {
                iq: symbol + awgn(rng, variance),
                timestamp_ms: start_ms + i as u64,
            }
        })
        .collect()
}

/// `count` repetitions of a known `symbol` with AWGN at `snr_db`, as seen on
/// a pilot carrier or during a training sequence.
pub fn synthesize_known(
    rng: &mut StdRng,
    symbol: Complex64,
    count: usize,
    snr_db: f64,
    start_ms: u64,
) -> Vec<SignalSample> {
    let variance = symbol.norm_sqr() * noise_variance(snr_db);
    (0..count)
        .map(|i| SignalSample {
            iq: symbol + awgn(rng, variance),
            timestamp_ms: start_ms + i as u64,
        })
        .collect()
}

fn noise_variance(snr_db: f64) -> f64 {
    10f64.powf(-snr_db / 10.0)
}
