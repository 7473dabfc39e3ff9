//! # Carrier Health Monitoring
//!
//! Authoritative per-carrier health records, the adaptive modulation control
//! loop that updates them, and the measurement jitter sources it can be
//! driven with.

pub mod carrier;
pub mod health;
pub mod jitter;

pub use carrier::{Carrier, CarrierTrend, HealthSample};
pub use health::{CarrierHealthMonitor, MonitorError, StatisticsSnapshot, TickReport};
pub use jitter::{ConstantJitter, JitterSource, NoJitter, UniformJitter};
