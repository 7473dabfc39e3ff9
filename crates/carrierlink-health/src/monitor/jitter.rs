//! Measurement jitter applied to modem-reported SNR.
//!
//! By default every reported SNR is perturbed by a uniform ±1 dB to model
//! measurement noise. Real modems already report noisy figures, so
//! the source is injectable and [`NoJitter`] turns it off.

use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub trait JitterSource: Send {
    /// Offset in dB to add to the next reported SNR.
    fn sample(&mut self) -> f64;
}

/// Trust the modem's figure as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&mut self) -> f64 {
        0.0
    }
}

/// Fixed offset on every sample; handy for exercising the zero clamp.
#[derive(Debug, Clone, Copy)]
pub struct ConstantJitter(pub f64);

impl JitterSource for ConstantJitter {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

/// Uniform offset in `[-amplitude_db, +amplitude_db]`.
#[derive(Debug)]
pub struct UniformJitter {
    amplitude_db: f64,
    rng: StdRng,
}

impl UniformJitter {
    /// Seeded from the wall clock.
    pub fn new(amplitude_db: f64) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::with_seed(amplitude_db, seed)
    }

    /// Reproducible sequence for a given seed.
    pub fn with_seed(amplitude_db: f64, seed: u64) -> Self {
        Self {
            amplitude_db: amplitude_db.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl JitterSource for UniformJitter {
    fn sample(&mut self) -> f64 {
        if self.amplitude_db == 0.0 {
            return 0.0;
        }
        self.rng
            .random_range(-self.amplitude_db..=self.amplitude_db)
    }
}
