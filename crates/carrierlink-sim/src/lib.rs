//! Simulation toolkit for carrierlink-health.
//!
//! Provides a deterministic simulated OFDM modem (seeded random-walk
//! fading with an optional frequency-selective notch) and I/Q sample
//! synthesis for exercising the SNR estimators without radio hardware.

pub mod modem;
pub mod samples;

pub use modem::{ChannelConfig, FadeNotch, ModemCommand, SimulatedModem};
pub use samples::{synthesize_known, synthesize_samples};
