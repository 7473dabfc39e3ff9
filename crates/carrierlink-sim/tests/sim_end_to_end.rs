//! Monitor, runtime and metrics exporter driven by the simulated modem.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use num_complex::Complex64;
use rand::SeedableRng;
use rand::rngs::StdRng;

use carrierlink_health::config::MonitorConfig;
use carrierlink_health::estimator::{REFERENCE_CEILING_DB, SignalQualityEstimator};
use carrierlink_health::metrics::MetricsServer;
use carrierlink_health::modem::Modem;
use carrierlink_health::modulation::Modulation;
use carrierlink_health::monitor::{CarrierHealthMonitor, NoJitter, UniformJitter};
use carrierlink_health::runtime::MonitorRuntime;
use carrierlink_sim::{
    ChannelConfig, FadeNotch, ModemCommand, SimulatedModem, synthesize_known, synthesize_samples,
};

fn steady_channel(snr: f64) -> ChannelConfig {
    ChannelConfig {
        base_snr_db: snr,
        step_db: 0.0,
        ..Default::default()
    }
}

fn monitor_on(channel: ChannelConfig) -> CarrierHealthMonitor<SimulatedModem> {
    let mut monitor =
        CarrierHealthMonitor::with_jitter(MonitorConfig::default(), Box::new(NoJitter)).unwrap();
    monitor.initialize(SimulatedModem::new(channel));
    monitor
}

// ─── Control Loop ────────────────────────────────────────────────────────────

#[test]
fn modem_follows_monitor_commands() {
    let mut monitor = monitor_on(steady_channel(22.0));
    monitor.tick_at(1).unwrap();

    let modem = monitor.modem().unwrap();
    for id in 0..48 {
        assert_eq!(modem.modulation(id), Some(Modulation::Qam64));
        assert_eq!(modem.is_enabled(id), Some(true));
    }
    assert_eq!(modem.commands().len(), 48);
    assert_eq!(monitor.command_failures(), 0);
}

#[test]
fn fade_notch_drops_carriers_in_the_notch() {
    let mut channel = steady_channel(18.0);
    channel.fade = Some(FadeNotch {
        center: 20,
        half_width: 2,
        depth_db: 17.0,
    });
    let mut monitor = monitor_on(channel);
    monitor.tick_at(1).unwrap();

    // 18 - 17 = 1 dB at the centre: below min_snr
    let centre = monitor.carrier_health(20).unwrap();
    assert!(!centre.enabled);
    assert_eq!(centre.modulation, Modulation::Bpsk);
    // 18 - 17/3 ≈ 12.3 dB two carriers out
    assert_eq!(monitor.carrier_health(22).unwrap().modulation, Modulation::Psk8);
    assert_eq!(monitor.carrier_health(30).unwrap().modulation, Modulation::Qam16);
    // Pilot 18 sits in the notch at 18 - 17/3 ≈ 12.3 dB and stays on regardless
    assert!(monitor.carrier_health(18).unwrap().enabled);

    let commands = monitor.modem_mut().unwrap().take_commands();
    assert!(commands.contains(&ModemCommand::SetEnabled {
        carrier_id: 20,
        enabled: false
    }));

    // Fade clears: carrier comes back
    monitor.modem_mut().unwrap().set_fade(None);
    monitor.tick_at(2).unwrap();
    let recovered = monitor.carrier_health(20).unwrap();
    assert!(recovered.enabled);
    assert_eq!(recovered.modulation, Modulation::Qam16);
}

#[test]
fn rejecting_modem_counts_failures_but_keeps_running() {
    let mut monitor = monitor_on(steady_channel(22.0));
    monitor.modem_mut().unwrap().set_reject_commands(true);
    monitor.tick_at(1).unwrap();
    assert_eq!(monitor.command_failures(), 48);
    assert_eq!(monitor.system_capacity(), 48 * 6);

    monitor.modem_mut().unwrap().set_reject_commands(false);
    monitor.tick_at(2).unwrap();
    // No ladder change on the second tick, so nothing re-sent
    assert!(monitor.modem().unwrap().commands().is_empty());
}

#[test]
fn seeded_runs_are_reproducible() {
    let run = |seed: u64| {
        let config = MonitorConfig::default();
        let jitter = Box::new(UniformJitter::with_seed(config.jitter_db, seed));
        let mut monitor = CarrierHealthMonitor::with_jitter(config, jitter).unwrap();
        monitor.initialize(SimulatedModem::new(ChannelConfig {
            seed,
            step_db: 1.5,
            ..Default::default()
        }));
        for t in 0..40 {
            monitor.tick_at(t).unwrap();
        }
        monitor
            .all_carrier_health()
            .into_iter()
            .map(|c| (c.snr, c.modulation, c.enabled))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(7), run(7));
}

// ─── Estimator Against Synthesized Samples ───────────────────────────────────

#[test]
fn pilot_estimate_recovers_channel_snr() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut estimator = SignalQualityEstimator::new(48);
    let pilot = estimator.pilot_symbol(12).unwrap();

    for target in [5.0, 12.0, 20.0] {
        let samples = synthesize_known(&mut rng, pilot, 4_000, target, 0);
        let snr = estimator.estimate_snr(12, &samples, None).unwrap();
        assert!((snr - target).abs() < 0.5, "target {target}, got {snr}");
    }
}

#[test]
fn data_aided_estimate_tracks_snr() {
    let mut rng = StdRng::seed_from_u64(12);
    let mut estimator = SignalQualityEstimator::new(48);
    let symbol = Complex64::new(0.0, 1.0);

    let low = estimator
        .estimate_snr(1, &synthesize_known(&mut rng, symbol, 4_000, 6.0, 0), Some(symbol))
        .unwrap();
    let high = estimator
        .estimate_snr(1, &synthesize_known(&mut rng, symbol, 4_000, 18.0, 0), Some(symbol))
        .unwrap();
    assert!(low < high);
    assert!(high <= REFERENCE_CEILING_DB);
    assert_eq!(estimator.buffered_samples(1), 0);
}

#[test]
fn blind_path_buffers_synthesized_blocks() {
    let mut rng = StdRng::seed_from_u64(13);
    let mut estimator = SignalQualityEstimator::new(48);
    for block in 0..3 {
        let samples = synthesize_samples(&mut rng, Modulation::Qpsk, 64, 15.0, block * 64);
        let snr = estimator.estimate_snr(5, &samples, None).unwrap();
        assert!(snr.is_finite());
    }
    assert_eq!(estimator.buffered_samples(5), 100);
    assert!(estimator.averaged_snr(5).is_finite());
}

// ─── Runtime & Metrics ───────────────────────────────────────────────────────

#[test]
fn runtime_exports_simulated_link_over_http() {
    let config = MonitorConfig {
        sample_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let mut monitor = CarrierHealthMonitor::with_jitter(config, Box::new(NoJitter)).unwrap();
    monitor.initialize(SimulatedModem::new(steady_channel(22.0)));
    let mut runtime = MonitorRuntime::start(monitor);

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let mut server = MetricsServer::start(addr, runtime.snapshot_handle()).unwrap();
    thread::sleep(Duration::from_millis(200));

    let mut stream = TcpStream::connect(server.addr()).unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("carrierlink_carriers_enabled 48"));
    assert!(response.contains("carrierlink_system_capacity_bits 288"));
    assert!(response.contains("carrierlink_modulation_carriers{modulation=\"64QAM\"} 48"));

    server.stop();
    runtime.stop();
    assert!(runtime.snapshot().tick_count >= 1);
}

#[test]
fn simulated_modem_works_behind_a_box() {
    let modem: Box<dyn Modem> = Box::new(SimulatedModem::new(steady_channel(9.0)));
    let mut monitor =
        CarrierHealthMonitor::with_jitter(MonitorConfig::default(), Box::new(NoJitter)).unwrap();
    monitor.initialize(modem);
    monitor.tick_at(1).unwrap();
    assert_eq!(monitor.carrier_health(1).unwrap().modulation, Modulation::Qpsk);
}
