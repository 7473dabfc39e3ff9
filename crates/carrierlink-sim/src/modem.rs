//! Simulated OFDM modem with a deterministic fading channel.
//!
//! Each call to [`carrier_status`](Modem::carrier_status) advances every
//! carrier's SNR by one bounded random-walk step. An optional fade notch
//! attenuates a contiguous band of carriers to model frequency-selective
//! fading. Commands from the monitor are applied to the simulated carrier
//! state and kept in a log for inspection.

use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

use carrierlink_health::modem::{CarrierStatus, Modem, ModemError};
use carrierlink_health::modulation::Modulation;

/// Bounds and step size of the per-carrier SNR random walk.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub seed: u64,
    pub carrier_count: usize,
    /// Starting SNR (dB) for every carrier.
    pub base_snr_db: f64,
    pub min_snr_db: f64,
    pub max_snr_db: f64,
    /// Largest change per status read, in dB.
    pub step_db: f64,
    pub fade: Option<FadeNotch>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            seed: 1,
            carrier_count: 48,
            base_snr_db: 18.0,
            min_snr_db: 0.0,
            max_snr_db: 30.0,
            step_db: 0.5,
            fade: None,
        }
    }
}

/// Triangular attenuation centred on one carrier.
///
/// The centre carrier loses `depth_db`; neighbours up to `half_width` away
/// lose proportionally less.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeNotch {
    pub center: usize,
    pub half_width: usize,
    pub depth_db: f64,
}

impl FadeNotch {
    pub fn attenuation_db(&self, carrier_id: usize) -> f64 {
        let distance = carrier_id.abs_diff(self.center);
        if distance > self.half_width {
            return 0.0;
        }
        self.depth_db * (1.0 - distance as f64 / (self.half_width + 1) as f64)
    }
}

/// A command the monitor sent to the modem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModemCommand {
    SetModulation { carrier_id: usize, modulation: Modulation },
    SetEnabled { carrier_id: usize, enabled: bool },
}

#[derive(Debug)]
pub struct SimulatedModem {
    cfg: ChannelConfig,
    rng: StdRng,
    snrs: Vec<f64>,
    modulations: Vec<Modulation>,
    enabled: Vec<bool>,
    commands: Vec<ModemCommand>,
    reject_commands: bool,
}

impl SimulatedModem {
    pub fn new(cfg: ChannelConfig) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        let base = cfg.base_snr_db.clamp(cfg.min_snr_db, cfg.max_snr_db);
        SimulatedModem {
            snrs: vec![base; cfg.carrier_count],
            modulations: vec![Modulation::Qpsk; cfg.carrier_count],
            enabled: vec![true; cfg.carrier_count],
            commands: Vec::new(),
            reject_commands: false,
            rng,
            cfg,
        }
    }

    pub fn carrier_count(&self) -> usize {
        self.cfg.carrier_count
    }

    /// Channel SNR of `carrier_id` before fade attenuation.
    pub fn channel_snr(&self, carrier_id: usize) -> Option<f64> {
        self.snrs.get(carrier_id).copied()
    }

    /// SNR the modem would report for `carrier_id` right now.
    pub fn reported_snr(&self, carrier_id: usize) -> Option<f64> {
        let fade = self
            .cfg
            .fade
            .map_or(0.0, |notch| notch.attenuation_db(carrier_id));
        self.channel_snr(carrier_id).map(|snr| snr - fade)
    }

    pub fn set_fade(&mut self, fade: Option<FadeNotch>) {
        self.cfg.fade = fade;
    }

    /// Pin every carrier's channel SNR to `snr_db` (still walks from there).
    pub fn set_channel_snr(&mut self, snr_db: f64) {
        let snr = snr_db.clamp(self.cfg.min_snr_db, self.cfg.max_snr_db);
        self.snrs.iter_mut().for_each(|s| *s = snr);
    }

    /// Make every subsequent command fail with [`ModemError::Rejected`].
    pub fn set_reject_commands(&mut self, reject: bool) {
        self.reject_commands = reject;
    }

    pub fn modulation(&self, carrier_id: usize) -> Option<Modulation> {
        self.modulations.get(carrier_id).copied()
    }

    pub fn is_enabled(&self, carrier_id: usize) -> Option<bool> {
        self.enabled.get(carrier_id).copied()
    }

    pub fn commands(&self) -> &[ModemCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<ModemCommand> {
        std::mem::take(&mut self.commands)
    }

    fn step_channel(&mut self) {
        let ChannelConfig {
            min_snr_db,
            max_snr_db,
            step_db,
            ..
        } = self.cfg;
        for snr in &mut self.snrs {
            let delta = rand_signed(&mut self.rng, step_db);
            *snr = (*snr + delta).clamp(min_snr_db, max_snr_db);
        }
    }

    fn check_command(&self, carrier_id: usize) -> Result<(), ModemError> {
        if carrier_id >= self.cfg.carrier_count {
            return Err(ModemError::UnknownCarrier(carrier_id));
        }
        if self.reject_commands {
            return Err(ModemError::Rejected {
                carrier_id,
                reason: "simulated modem is rejecting commands".into(),
            });
        }
        Ok(())
    }
}

impl Modem for SimulatedModem {
    fn carrier_status(&mut self) -> Vec<CarrierStatus> {
        self.step_channel();
        (0..self.cfg.carrier_count)
            .map(|id| CarrierStatus {
                snr: self.reported_snr(id).unwrap_or(0.0),
            })
            .collect()
    }

    fn set_carrier_modulation(
        &mut self,
        carrier_id: usize,
        modulation: Modulation,
    ) -> Result<(), ModemError> {
        self.check_command(carrier_id)?;
        self.modulations[carrier_id] = modulation;
        self.commands.push(ModemCommand::SetModulation {
            carrier_id,
            modulation,
        });
        Ok(())
    }

    fn set_carrier_enabled(&mut self, carrier_id: usize, enabled: bool) -> Result<(), ModemError> {
        self.check_command(carrier_id)?;
        self.enabled[carrier_id] = enabled;
        self.commands.push(ModemCommand::SetEnabled {
            carrier_id,
            enabled,
        });
        Ok(())
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(seed: u64, reads: usize) -> Vec<Vec<f64>> {
        let mut modem = SimulatedModem::new(ChannelConfig {
            seed,
            ..Default::default()
        });
        (0..reads)
            .map(|_| modem.carrier_status().iter().map(|s| s.snr).collect())
            .collect()
    }

    #[test]
    fn channel_is_deterministic_for_seed() {
        assert_eq!(walk(42, 20), walk(42, 20));
        assert_ne!(walk(42, 20), walk(43, 20));
    }

    #[test]
    fn walk_stays_within_bounds() {
        let mut modem = SimulatedModem::new(ChannelConfig {
            base_snr_db: 1.0,
            min_snr_db: 0.0,
            max_snr_db: 3.0,
            step_db: 2.0,
            ..Default::default()
        });
        for _ in 0..500 {
            for status in modem.carrier_status() {
                assert!((0.0..=3.0).contains(&status.snr), "{}", status.snr);
            }
        }
    }

    #[test]
    fn zero_step_holds_snr() {
        let mut modem = SimulatedModem::new(ChannelConfig {
            step_db: 0.0,
            base_snr_db: 12.5,
            ..Default::default()
        });
        for _ in 0..5 {
            assert!(modem.carrier_status().iter().all(|s| s.snr == 12.5));
        }
    }

    #[test]
    fn fade_notch_is_triangular() {
        let notch = FadeNotch {
            center: 20,
            half_width: 3,
            depth_db: 16.0,
        };
        assert_eq!(notch.attenuation_db(20), 16.0);
        assert_eq!(notch.attenuation_db(19), 12.0);
        assert_eq!(notch.attenuation_db(23), 4.0);
        assert_eq!(notch.attenuation_db(24), 0.0);
        assert_eq!(notch.attenuation_db(0), 0.0);
    }

    #[test]
    fn fade_applies_to_reported_snr() {
        let mut modem = SimulatedModem::new(ChannelConfig {
            step_db: 0.0,
            base_snr_db: 20.0,
            fade: Some(FadeNotch {
                center: 10,
                half_width: 1,
                depth_db: 10.0,
            }),
            ..Default::default()
        });
        let statuses = modem.carrier_status();
        assert_eq!(statuses[10].snr, 10.0);
        assert_eq!(statuses[11].snr, 15.0);
        assert_eq!(statuses[12].snr, 20.0);
        assert_eq!(modem.channel_snr(10), Some(20.0));
    }

    #[test]
    fn commands_are_applied_and_logged() {
        let mut modem = SimulatedModem::new(ChannelConfig::default());
        modem.set_carrier_modulation(3, Modulation::Qam16).unwrap();
        modem.set_carrier_enabled(4, false).unwrap();
        assert_eq!(modem.modulation(3), Some(Modulation::Qam16));
        assert_eq!(modem.is_enabled(4), Some(false));
        assert_eq!(
            modem.take_commands(),
            vec![
                ModemCommand::SetModulation {
                    carrier_id: 3,
                    modulation: Modulation::Qam16
                },
                ModemCommand::SetEnabled {
                    carrier_id: 4,
                    enabled: false
                },
            ]
        );
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn rejected_and_unknown_commands() {
        let mut modem = SimulatedModem::new(ChannelConfig::default());
        assert_eq!(
            modem.set_carrier_enabled(48, true),
            Err(ModemError::UnknownCarrier(48))
        );
        modem.set_reject_commands(true);
        assert!(matches!(
            modem.set_carrier_modulation(1, Modulation::Bpsk),
            Err(ModemError::Rejected { carrier_id: 1, .. })
        ));
        assert_eq!(modem.modulation(1), Some(Modulation::Qpsk));
        assert!(modem.commands().is_empty());
    }
}
