//! # Carrier Health Monitor
//!
//! Owns the health record of every carrier and runs one step of the
//! adaptive control loop per [`tick`](CarrierHealthMonitor::tick):
//!
//! 1. read per-carrier status from the modem,
//! 2. perturb the reported SNR by the jitter source and clamp at 0 dB,
//! 3. derive BER from the carrier's current modulation,
//! 4. recommend a transmit power,
//! 5. walk the modulation ladder (when adaptive modulation is on),
//! 6. enable or disable data carriers against `min_snr`,
//! 7. append a [`HealthSample`] to the bounded history.
//!
//! The monitor does no timing of its own; [`MonitorRuntime`](crate::runtime::MonitorRuntime)
//! or any external scheduler calls `tick` on its cadence.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::carrier::{Carrier, CarrierTrend, HealthSample};
use super::jitter::{JitterSource, UniformJitter};
use crate::config::{ConfigError, MonitorConfig, MonitorConfigInput};
use crate::modem::{Modem, ModemError};
use crate::modulation::{Modulation, recommended_power};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    #[error("monitor is not attached to a modem")]
    NotAttached,
    #[error("unknown carrier {0}")]
    UnknownCarrier(usize),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Aggregate view over the enabled carriers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_carriers: usize,
    pub enabled_carriers: usize,
    pub average_snr: f64,
    pub average_ber: f64,
    /// Bits per OFDM symbol across all enabled carriers.
    pub system_capacity: u32,
    /// Enabled carriers per scheme; every scheme is present.
    pub modulation_distribution: BTreeMap<Modulation, usize>,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub updated: usize,
    /// Carriers without a status entry this tick.
    pub skipped: usize,
    pub modulation_changes: usize,
    pub enable_changes: usize,
}

pub struct CarrierHealthMonitor<M> {
    config: MonitorConfig,
    carriers: Vec<Carrier>,
    modem: Option<M>,
    jitter: Box<dyn JitterSource>,
    /// Rebuild the jitter source when `jitter_db` changes.
    default_jitter: bool,
    tick_count: u64,
    command_failures: u64,
}

impl<M: Modem> CarrierHealthMonitor<M> {
    /// Monitor with the default ±`jitter_db` uniform measurement jitter.
    pub fn new(config: MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let jitter = Box::new(UniformJitter::new(config.jitter_db));
        let mut monitor = Self::build(config, jitter);
        monitor.default_jitter = true;
        Ok(monitor)
    }

    /// Monitor with a caller-supplied jitter source (e.g. `NoJitter` for a real modem).
    pub fn with_jitter(
        config: MonitorConfig,
        jitter: Box<dyn JitterSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, jitter))
    }

    fn build(config: MonitorConfig, jitter: Box<dyn JitterSource>) -> Self {
        CarrierHealthMonitor {
            config,
            carriers: Vec::new(),
            modem: None,
            jitter,
            default_jitter: false,
            tick_count: 0,
            command_failures: 0,
        }
    }

    /// Bind to `modem` and create `carrier_count` fresh carrier records.
    ///
    /// Any previously attached modem is dropped.
    pub fn initialize(&mut self, modem: M) {
        self.modem = Some(modem);
        self.create_carriers();
        info!(
            carriers = self.carriers.len(),
            pilots = self.carriers.iter().filter(|c| c.is_pilot).count(),
            "carrier health monitor attached"
        );
    }

    /// Release the modem. Carrier records are kept until the next `reset`.
    pub fn detach(&mut self) -> Option<M> {
        self.modem.take()
    }

    pub fn is_attached(&self) -> bool {
        self.modem.is_some()
    }

    pub fn modem(&self) -> Option<&M> {
        self.modem.as_ref()
    }

    pub fn modem_mut(&mut self) -> Option<&mut M> {
        self.modem.as_mut()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Number of ticks run since construction.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Modem commands that returned an error since construction.
    pub fn command_failures(&self) -> u64 {
        self.command_failures
    }

    /// Run one control-loop step stamped with the current wall-clock time.
    pub fn tick(&mut self) -> Result<TickReport, MonitorError> {
        self.tick_at(crate::unix_millis())
    }

    /// Run one control-loop step stamped with `now_ms`.
    pub fn tick_at(&mut self, now_ms: u64) -> Result<TickReport, MonitorError> {
        let Self {
            config,
            carriers,
            modem,
            jitter,
            command_failures,
            ..
        } = self;
        let modem = modem.as_mut().ok_or(MonitorError::NotAttached)?;

        let statuses = modem.carrier_status();
        let mut report = TickReport::default();

        for carrier in carriers.iter_mut() {
            let Some(status) = statuses.get(carrier.id) else {
                report.skipped += 1;
                continue;
            };

            let snr = (status.snr + jitter.sample()).max(0.0);
            let ber = carrier.modulation.ber(snr);
            carrier.snr = snr;
            carrier.ber = ber;
            carrier.power_level = recommended_power(snr);

            if config.adaptive_modulation_enabled {
                let target = config.snr_thresholds.select(snr);
                if target != carrier.modulation {
                    apply_modulation(carrier, target, modem, command_failures);
                    report.modulation_changes += 1;
                }
            }

            let enabled = carrier.is_pilot || snr >= config.min_snr;
            if enabled != carrier.enabled {
                carrier.enabled = enabled;
                report.enable_changes += 1;
                debug!(carrier_id = carrier.id, enabled, snr, "carrier enable state changed");
                record_failure(
                    modem.set_carrier_enabled(carrier.id, enabled),
                    command_failures,
                );
            }

            carrier.record(HealthSample::new(now_ms, snr, ber), config.history_size);
            carrier.last_update_ms = now_ms;
            report.updated += 1;
        }

        if report.skipped > 0 {
            debug!(
                skipped = report.skipped,
                reported = statuses.len(),
                "carriers without modem status this tick"
            );
        }

        self.tick_count += 1;
        Ok(report)
    }

    pub fn carrier_count(&self) -> usize {
        self.carriers.len()
    }

    pub fn carrier_health(&self, carrier_id: usize) -> Option<Carrier> {
        self.carriers.get(carrier_id).cloned()
    }

    pub fn all_carrier_health(&self) -> Vec<Carrier> {
        self.carriers.clone()
    }

    /// Enabled carriers that also meet `min_snr`.
    pub fn healthy_carriers(&self) -> Vec<Carrier> {
        self.carriers
            .iter()
            .filter(|c| c.enabled && c.snr >= self.config.min_snr)
            .cloned()
            .collect()
    }

    /// Manually enable or disable a data carrier. Pilots are left untouched.
    ///
    /// The next tick re-applies the `min_snr` policy.
    pub fn set_carrier_enabled(
        &mut self,
        carrier_id: usize,
        enabled: bool,
    ) -> Result<(), MonitorError> {
        let modem = self.modem.as_mut().ok_or(MonitorError::NotAttached)?;
        let carrier = self
            .carriers
            .get_mut(carrier_id)
            .ok_or(MonitorError::UnknownCarrier(carrier_id))?;
        if carrier.is_pilot {
            return Ok(());
        }
        carrier.enabled = enabled;
        record_failure(
            modem.set_carrier_enabled(carrier_id, enabled),
            &mut self.command_failures,
        );
        Ok(())
    }

    /// Set a carrier's modulation directly, bypassing the ladder.
    ///
    /// With adaptive modulation on, the next tick may move it again.
    pub fn force_carrier_modulation(
        &mut self,
        carrier_id: usize,
        modulation: Modulation,
    ) -> Result<(), MonitorError> {
        let modem = self.modem.as_mut().ok_or(MonitorError::NotAttached)?;
        let carrier = self
            .carriers
            .get_mut(carrier_id)
            .ok_or(MonitorError::UnknownCarrier(carrier_id))?;
        apply_modulation(carrier, modulation, modem, &mut self.command_failures);
        Ok(())
    }

    /// Mean SNR over enabled carriers; 0 when none are enabled.
    pub fn average_snr(&self) -> f64 {
        mean(self.enabled().map(|c| c.snr))
    }

    /// Bits per symbol summed over enabled carriers.
    pub fn system_capacity(&self) -> u32 {
        self.enabled().map(|c| c.capacity_bits_per_symbol).sum()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        let mut modulation_distribution: BTreeMap<Modulation, usize> =
            Modulation::ALL.iter().map(|&m| (m, 0)).collect();
        for carrier in self.enabled() {
            *modulation_distribution.entry(carrier.modulation).or_default() += 1;
        }

        StatisticsSnapshot {
            total_carriers: self.carriers.len(),
            enabled_carriers: self.enabled().count(),
            average_snr: self.average_snr(),
            average_ber: mean(self.enabled().map(|c| c.ber)),
            system_capacity: self.system_capacity(),
            modulation_distribution,
        }
    }

    pub fn carrier_trend(&self, carrier_id: usize) -> Option<CarrierTrend> {
        self.carriers.get(carrier_id).map(Carrier::trend)
    }

    /// Merge `update` into the active config.
    ///
    /// An invalid result is rejected and the active config is left as it was.
    /// A new `carrier_count` applies at the next `initialize` or `reset`.
    pub fn update_config(&mut self, update: &MonitorConfigInput) -> Result<(), ConfigError> {
        let merged = update.merge_onto(&self.config).inspect_err(|e| {
            warn!(error = %e, "rejected monitor config update");
        })?;

        if merged.history_size < self.config.history_size {
            for carrier in &mut self.carriers {
                carrier.truncate_history(merged.history_size);
            }
        }
        if self.default_jitter && merged.jitter_db != self.config.jitter_db {
            self.jitter = Box::new(UniformJitter::new(merged.jitter_db));
        }

        info!(
            interval_ms = merged.sample_interval.as_millis() as u64,
            history_size = merged.history_size,
            min_snr = merged.min_snr,
            adaptive = merged.adaptive_modulation_enabled,
            "monitor config updated"
        );
        self.config = merged;
        Ok(())
    }

    /// Drop every carrier record; recreate them if a modem is still attached.
    pub fn reset(&mut self) {
        self.carriers.clear();
        if self.modem.is_some() {
            self.create_carriers();
        }
        info!(carriers = self.carriers.len(), "carrier health monitor reset");
    }

    fn create_carriers(&mut self) {
        let now_ms = crate::unix_millis();
        self.carriers = (0..self.config.carrier_count)
            .map(|id| Carrier::new(id, now_ms))
            .collect();
    }

    fn enabled(&self) -> impl Iterator<Item = &Carrier> {
        self.carriers.iter().filter(|c| c.enabled)
    }
}

fn apply_modulation<M: Modem>(
    carrier: &mut Carrier,
    modulation: Modulation,
    modem: &mut M,
    failures: &mut u64,
) {
    let previous = carrier.modulation;
    carrier.set_modulation(modulation);
    if previous != modulation {
        info!(
            carrier_id = carrier.id,
            from = %previous,
            to = %modulation,
            snr = carrier.snr,
            "carrier modulation changed"
        );
    }
    record_failure(modem.set_carrier_modulation(carrier.id, modulation), failures);
}

fn record_failure(result: Result<(), ModemError>, failures: &mut u64) {
    if let Err(e) = result {
        *failures += 1;
        warn!(error = %e, "modem command failed");
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
