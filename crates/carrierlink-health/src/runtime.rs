use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, MonitorConfigInput};
use crate::metrics::HealthSnapshot;
use crate::modem::Modem;
use crate::modulation::Modulation;
use crate::monitor::{Carrier, CarrierHealthMonitor, CarrierTrend, MonitorError, StatisticsSnapshot};

/// Control messages sent to the worker thread.
enum ControlMessage {
    /// Run a tick now instead of waiting for the interval.
    TickNow,
    Shutdown,
}

/// Thread-safe handle to a carrier health monitor ticking in the background.
///
/// The worker thread holds the monitor lock for exactly one full tick, so
/// readers never observe a half-updated carrier set. Every accessor returns
/// copies. After each tick the worker publishes a [`HealthSnapshot`] that
/// metrics exporters can read without touching the monitor lock.
///
/// Dropping the runtime stops the worker.
pub struct MonitorRuntime<M: Modem + 'static> {
    monitor: Arc<Mutex<CarrierHealthMonitor<M>>>,
    snapshot: Arc<Mutex<HealthSnapshot>>,
    control_tx: Option<Sender<ControlMessage>>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<M: Modem + 'static> MonitorRuntime<M> {
    /// Take ownership of `monitor` and start ticking it on its configured interval.
    pub fn start(monitor: CarrierHealthMonitor<M>) -> Self {
        let snapshot = Arc::new(Mutex::new(HealthSnapshot::capture(&monitor)));
        let mut runtime = Self {
            monitor: Arc::new(Mutex::new(monitor)),
            snapshot,
            control_tx: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        runtime.spawn_worker();
        runtime
    }

    fn spawn_worker(&mut self) {
        let (control_tx, control_rx) = bounded(16);
        let monitor = self.monitor.clone();
        let snapshot = self.snapshot.clone();
        let running = self.running.clone();
        running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("carrierlink-monitor".into())
            .spawn(move || monitor_worker(monitor, snapshot, control_rx, running))
            .expect("failed to spawn carrier monitor worker");

        self.control_tx = Some(control_tx);
        self.handle = Some(handle);
        info!("monitor runtime started");
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop ticking. Idempotent; no tick runs after this returns.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(ControlMessage::Shutdown);
        }
        let _ = handle.join();
        info!("monitor runtime stopped");
    }

    /// Stop, rebuild the carrier set, and restart if a modem is still attached.
    pub fn reset(&mut self) {
        self.stop();
        let attached = {
            let mut monitor = self.lock();
            monitor.reset();
            *self.lock_snapshot() = HealthSnapshot::capture(&*monitor);
            monitor.is_attached()
        };
        if attached {
            self.spawn_worker();
        }
    }

    /// Ask the worker to tick immediately. No-op when stopped.
    pub fn tick_now(&self) {
        if let Some(tx) = &self.control_tx {
            let _ = tx.try_send(ControlMessage::TickNow);
        }
    }

    /// Merge a partial config; a changed interval applies from the next wait.
    pub fn update_config(&self, update: &MonitorConfigInput) -> Result<(), ConfigError> {
        self.lock().update_config(update)
    }

    /// Run `f` with exclusive access to the monitor, between ticks.
    pub fn with_monitor<R>(&self, f: impl FnOnce(&mut CarrierHealthMonitor<M>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn carrier_health(&self, carrier_id: usize) -> Option<Carrier> {
        self.lock().carrier_health(carrier_id)
    }

    pub fn all_carrier_health(&self) -> Vec<Carrier> {
        self.lock().all_carrier_health()
    }

    pub fn healthy_carriers(&self) -> Vec<Carrier> {
        self.lock().healthy_carriers()
    }

    pub fn system_capacity(&self) -> u32 {
        self.lock().system_capacity()
    }

    pub fn average_snr(&self) -> f64 {
        self.lock().average_snr()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.lock().statistics()
    }

    pub fn carrier_trend(&self, carrier_id: usize) -> Option<CarrierTrend> {
        self.lock().carrier_trend(carrier_id)
    }

    pub fn set_carrier_enabled(&self, carrier_id: usize, enabled: bool) -> Result<(), MonitorError> {
        self.lock().set_carrier_enabled(carrier_id, enabled)
    }

    pub fn force_carrier_modulation(
        &self,
        carrier_id: usize,
        modulation: Modulation,
    ) -> Result<(), MonitorError> {
        self.lock().force_carrier_modulation(carrier_id, modulation)
    }

    /// Latest snapshot published by the worker.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.lock_snapshot().clone()
    }

    /// Shared handle to the published snapshot, for external exporters.
    pub fn snapshot_handle(&self) -> Arc<Mutex<HealthSnapshot>> {
        self.snapshot.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CarrierHealthMonitor<M>> {
        self.monitor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, HealthSnapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<M: Modem + 'static> Drop for MonitorRuntime<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_worker<M: Modem>(
    monitor: Arc<Mutex<CarrierHealthMonitor<M>>>,
    snapshot: Arc<Mutex<HealthSnapshot>>,
    control_rx: Receiver<ControlMessage>,
    running: Arc<AtomicBool>,
) {
    let mut next_tick = Instant::now() + current_interval(&monitor);

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match control_rx.recv_timeout(wait) {
            Ok(ControlMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(ControlMessage::TickNow) | Err(RecvTimeoutError::Timeout) => {}
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        let interval = {
            let mut guard = monitor.lock().unwrap_or_else(|e| e.into_inner());
            match guard.tick() {
                Ok(report) => debug!(
                    tick = guard.tick_count(),
                    updated = report.updated,
                    skipped = report.skipped,
                    modulation_changes = report.modulation_changes,
                    enable_changes = report.enable_changes,
                    "monitor tick"
                ),
                Err(e) => warn!(error = %e, "monitor tick skipped"),
            }
            if let Ok(mut snap) = snapshot.lock() {
                *snap = HealthSnapshot::capture(&*guard);
            }
            guard.config().sample_interval
        };

        next_tick = Instant::now() + interval;
    }
}

fn current_interval<M: Modem>(monitor: &Mutex<CarrierHealthMonitor<M>>) -> Duration {
    monitor
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .config()
        .sample_interval
}
