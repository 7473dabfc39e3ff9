//! Boundary to the physical OFDM modem.
//!
//! The modem produces per-carrier status each tick and executes modulation
//! and enable commands. Commands are fire-and-forget from the control loop's
//! point of view: a rejected command is logged and counted, never retried
//! within the same tick.

use thiserror::Error;

use crate::modulation::Modulation;

/// Status reported by the modem for one carrier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CarrierStatus {
    /// Modem-reported SNR in dB.
    pub snr: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModemError {
    #[error("carrier {0} is not present on this modem")]
    UnknownCarrier(usize),
    #[error("modem rejected command for carrier {carrier_id}: {reason}")]
    Rejected { carrier_id: usize, reason: String },
}

pub trait Modem: Send {
    /// Current status for every carrier, ordered by carrier id.
    ///
    /// May be shorter than the number of tracked carriers; carriers without
    /// an entry are skipped for the tick.
    fn carrier_status(&mut self) -> Vec<CarrierStatus>;

    fn set_carrier_modulation(
        &mut self,
        carrier_id: usize,
        modulation: Modulation,
    ) -> Result<(), ModemError>;

    fn set_carrier_enabled(&mut self, carrier_id: usize, enabled: bool) -> Result<(), ModemError>;
}

impl<M: Modem + ?Sized> Modem for Box<M> {
    fn carrier_status(&mut self) -> Vec<CarrierStatus> {
        (**self).carrier_status()
    }

    fn set_carrier_modulation(
        &mut self,
        carrier_id: usize,
        modulation: Modulation,
    ) -> Result<(), ModemError> {
        (**self).set_carrier_modulation(carrier_id, modulation)
    }

    fn set_carrier_enabled(&mut self, carrier_id: usize, enabled: bool) -> Result<(), ModemError> {
        (**self).set_carrier_enabled(carrier_id, enabled)
    }
}
