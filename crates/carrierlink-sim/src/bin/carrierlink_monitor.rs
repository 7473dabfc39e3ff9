//! # carrierlink-monitor
//!
//! Runs the carrier health monitor against the simulated modem and reports
//! link statistics. Useful for tuning thresholds and eyeballing the
//! adaptive ladder without radio hardware.
//!
//! ## Usage
//!
//! ```bash
//! # Run until Ctrl-C with default policy
//! carrierlink-monitor
//!
//! # 30 ticks with a deep fade around carrier 20, JSON summary on exit
//! carrierlink-monitor --ticks 30 --fade-center 20 --fade-depth 18 --json
//!
//! # Custom policy and Prometheus metrics
//! carrierlink-monitor --config monitor.toml --metrics-port 9100
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use carrierlink_health::config::MonitorConfig;
use carrierlink_health::metrics::{MetricsServer, to_telemetry_json};
use carrierlink_health::monitor::{CarrierHealthMonitor, UniformJitter};
use carrierlink_health::runtime::MonitorRuntime;
use carrierlink_sim::{ChannelConfig, FadeNotch, SimulatedModem};

/// Carrier health monitor driven by a simulated OFDM modem.
#[derive(Parser, Debug)]
#[command(name = "carrierlink-monitor", about = "Carrier health monitor simulation")]
struct Cli {
    /// Monitor policy TOML file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the channel random walk and measurement jitter.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Stop after this many ticks (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print a JSON telemetry summary to stdout on exit.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Starting channel SNR in dB.
    #[arg(long, default_value_t = 18.0)]
    base_snr: f64,

    /// Centre carrier of a frequency-selective fade.
    #[arg(long)]
    fade_center: Option<usize>,

    /// Attenuation at the fade centre in dB.
    #[arg(long, default_value_t = 15.0)]
    fade_depth: f64,

    /// Carriers either side of the centre affected by the fade.
    #[arg(long, default_value_t = 3)]
    fade_half_width: usize,
}

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();

    // ── Config ──────────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MonitorConfig::from_toml_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };

    tracing::info!(
        carriers = config.carrier_count,
        interval_ms = config.sample_interval.as_millis() as u64,
        min_snr = config.min_snr,
        seed = cli.seed,
        ticks = cli.ticks,
        "carrierlink-monitor starting"
    );

    // ── Monitor ─────────────────────────────────────────────────
    let modem = SimulatedModem::new(ChannelConfig {
        seed: cli.seed,
        carrier_count: config.carrier_count,
        base_snr_db: cli.base_snr,
        fade: cli.fade_center.map(|center| FadeNotch {
            center,
            half_width: cli.fade_half_width,
            depth_db: cli.fade_depth,
        }),
        ..Default::default()
    });
    let jitter = Box::new(UniformJitter::with_seed(config.jitter_db, cli.seed));
    let mut monitor = CarrierHealthMonitor::with_jitter(config, jitter)?;
    monitor.initialize(modem);

    let mut runtime = MonitorRuntime::start(monitor);

    // ── Metrics server (optional) ───────────────────────────────
    let _metrics = match cli.metrics_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            Some(MetricsServer::start(addr, runtime.snapshot_handle())?)
        }
        None => None,
    };

    // ── Graceful shutdown ───────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    // ── Main loop ───────────────────────────────────────────────
    let mut last_stats_log = Instant::now();
    let stats_interval = Duration::from_secs(5);

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
        let snapshot = runtime.snapshot();

        if last_stats_log.elapsed() >= stats_interval {
            let stats = &snapshot.statistics;
            tracing::info!(
                tick = snapshot.tick_count,
                enabled = stats.enabled_carriers,
                total = stats.total_carriers,
                average_snr = stats.average_snr,
                capacity = stats.system_capacity,
                failures = snapshot.command_failures,
                "link stats"
            );
            last_stats_log = Instant::now();
        }

        if cli.ticks > 0 && snapshot.tick_count >= cli.ticks {
            break;
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────
    runtime.stop();
    let snapshot = runtime.snapshot();
    let stats = &snapshot.statistics;
    tracing::info!(
        ticks = snapshot.tick_count,
        enabled = stats.enabled_carriers,
        capacity = stats.system_capacity,
        "carrierlink-monitor stopped"
    );

    if cli.json {
        println!("{}", to_telemetry_json(&snapshot));
    }

    Ok(())
}
