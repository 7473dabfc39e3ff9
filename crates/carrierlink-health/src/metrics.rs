//! # Prometheus Metrics
//!
//! Renders carrier health in Prometheus text exposition format and
//! provides a lightweight HTTP server for scraping.

use std::fmt::Write;
use std::io::{Read, Write as IoWrite};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::modem::Modem;
use crate::modulation::Modulation;
use crate::monitor::{Carrier, CarrierHealthMonitor, StatisticsSnapshot};

/// Point-in-time copy of everything an exporter needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub statistics: StatisticsSnapshot,
    pub carriers: Vec<Carrier>,
    pub tick_count: u64,
    pub command_failures: u64,
    pub timestamp_ms: u64,
}

impl HealthSnapshot {
    pub fn capture<M: Modem>(monitor: &CarrierHealthMonitor<M>) -> Self {
        HealthSnapshot {
            statistics: monitor.statistics(),
            carriers: monitor.all_carrier_health(),
            tick_count: monitor.tick_count(),
            command_failures: monitor.command_failures(),
            timestamp_ms: crate::unix_millis(),
        }
    }
}

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    writeln!(out, "# HELP {name} {help}").unwrap();
    writeln!(out, "# TYPE {name} {kind}").unwrap();
}

/// Render a health snapshot as Prometheus text exposition format.
pub fn render_prometheus(snapshot: &HealthSnapshot) -> String {
    let mut out = String::with_capacity(4096 + snapshot.carriers.len() * 512);
    let carriers = &snapshot.carriers;

    // ── Per-carrier gauges ──────────────────────────────────────

    header(
        &mut out,
        "carrierlink_carrier_snr_db",
        "gauge",
        "Latest measured SNR in dB.",
    );
    for c in carriers {
        writeln!(
            out,
            "carrierlink_carrier_snr_db{{carrier_id=\"{}\"}} {:.3}",
            c.id, c.snr
        )
        .unwrap();
    }

    header(
        &mut out,
        "carrierlink_carrier_ber",
        "gauge",
        "Modelled bit error rate at the current modulation.",
    );
    for c in carriers {
        writeln!(
            out,
            "carrierlink_carrier_ber{{carrier_id=\"{}\"}} {:e}",
            c.id, c.ber
        )
        .unwrap();
    }

    header(
        &mut out,
        "carrierlink_carrier_power_level",
        "gauge",
        "Recommended relative transmit power (0.0-1.0).",
    );
    for c in carriers {
        writeln!(
            out,
            "carrierlink_carrier_power_level{{carrier_id=\"{}\"}} {:.2}",
            c.id, c.power_level
        )
        .unwrap();
    }

    header(
        &mut out,
        "carrierlink_carrier_bits_per_symbol",
        "gauge",
        "Bits per symbol of the active modulation.",
    );
    for c in carriers {
        writeln!(
            out,
            "carrierlink_carrier_bits_per_symbol{{carrier_id=\"{}\",modulation=\"{}\"}} {}",
            c.id,
            c.modulation.as_str(),
            c.capacity_bits_per_symbol
        )
        .unwrap();
    }

    header(
        &mut out,
        "carrierlink_carrier_enabled",
        "gauge",
        "Whether the carrier is enabled (1) or disabled (0).",
    );
    for c in carriers {
        let v = if c.enabled { 1 } else { 0 };
        writeln!(out, "carrierlink_carrier_enabled{{carrier_id=\"{}\"}} {v}", c.id).unwrap();
    }

    header(
        &mut out,
        "carrierlink_carrier_trend",
        "gauge",
        "SNR trend encoded as integer (-1=degrading, 0=stable, 1=improving).",
    );
    for c in carriers {
        let trend = c.trend();
        writeln!(
            out,
            "carrierlink_carrier_trend{{carrier_id=\"{}\",trend=\"{}\"}} {}",
            c.id,
            trend.as_str(),
            trend_to_i8(trend)
        )
        .unwrap();
    }

    // ── Aggregate metrics ───────────────────────────────────────

    let stats = &snapshot.statistics;

    header(
        &mut out,
        "carrierlink_carriers_total",
        "gauge",
        "Total number of tracked carriers.",
    );
    writeln!(out, "carrierlink_carriers_total {}", stats.total_carriers).unwrap();

    header(
        &mut out,
        "carrierlink_carriers_enabled",
        "gauge",
        "Number of carriers currently enabled.",
    );
    writeln!(out, "carrierlink_carriers_enabled {}", stats.enabled_carriers).unwrap();

    header(
        &mut out,
        "carrierlink_average_snr_db",
        "gauge",
        "Mean SNR over enabled carriers.",
    );
    writeln!(out, "carrierlink_average_snr_db {:.3}", stats.average_snr).unwrap();

    header(
        &mut out,
        "carrierlink_average_ber",
        "gauge",
        "Mean BER over enabled carriers.",
    );
    writeln!(out, "carrierlink_average_ber {:e}", stats.average_ber).unwrap();

    header(
        &mut out,
        "carrierlink_system_capacity_bits",
        "gauge",
        "Bits per OFDM symbol across enabled carriers.",
    );
    writeln!(out, "carrierlink_system_capacity_bits {}", stats.system_capacity).unwrap();

    header(
        &mut out,
        "carrierlink_modulation_carriers",
        "gauge",
        "Enabled carriers per modulation scheme.",
    );
    for m in Modulation::ALL {
        let count = stats.modulation_distribution.get(&m).copied().unwrap_or(0);
        writeln!(
            out,
            "carrierlink_modulation_carriers{{modulation=\"{}\"}} {count}",
            m.as_str()
        )
        .unwrap();
    }

    header(
        &mut out,
        "carrierlink_ticks_total",
        "counter",
        "Control-loop ticks run.",
    );
    writeln!(out, "carrierlink_ticks_total {}", snapshot.tick_count).unwrap();

    header(
        &mut out,
        "carrierlink_modem_command_failures_total",
        "counter",
        "Modem commands that returned an error.",
    );
    writeln!(
        out,
        "carrierlink_modem_command_failures_total {}",
        snapshot.command_failures
    )
    .unwrap();

    out
}

fn trend_to_i8(trend: crate::monitor::CarrierTrend) -> i8 {
    use crate::monitor::CarrierTrend;
    match trend {
        CarrierTrend::Degrading => -1,
        CarrierTrend::Stable => 0,
        CarrierTrend::Improving => 1,
    }
}

/// A lightweight HTTP server that serves `/metrics` for Prometheus scraping.
///
/// Runs in a background thread, reading from the shared snapshot published
/// by [`MonitorRuntime`](crate::runtime::MonitorRuntime).
pub struct MetricsServer {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Start the metrics server on the given address.
    ///
    /// `source` is usually `MonitorRuntime::snapshot_handle()`.
    pub fn start(
        bind_addr: SocketAddr,
        source: Arc<Mutex<HealthSnapshot>>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = thread::Builder::new()
            .name("carrierlink-metrics".into())
            .spawn(move || serve_loop(listener, source, running_clone))
            .map_err(std::io::Error::other)?;

        tracing::info!(%addr, "metrics server listening");
        Ok(MetricsServer {
            running,
            handle: Some(handle),
            addr,
        })
    }

    /// The address the server is actually listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve_loop(listener: TcpListener, source: Arc<Mutex<HealthSnapshot>>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                let snap = source.lock().unwrap_or_else(|e| e.into_inner()).clone();
                handle_connection(stream, &snap);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                tracing::debug!(error = %e, "metrics accept failed");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, snapshot: &HealthSnapshot) {
    // Accepted sockets may inherit the listener's nonblocking flag.
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let mut buf = [0u8; 1024];
    let n = match stream.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]);

    let response = if request.starts_with("GET /metrics") {
        let body = render_prometheus(snapshot);
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    };
    let _ = stream.write_all(response.as_bytes());
}

/// Compact JSON telemetry: aggregates plus one summary object per carrier.
///
/// Histories are left out; use `serde_json::to_string(&snapshot)` for the
/// full record.
pub fn to_telemetry_json(snapshot: &HealthSnapshot) -> String {
    let carriers: Vec<serde_json::Value> = snapshot
        .carriers
        .iter()
        .map(|c| {
            serde_json::json!({
                "id": c.id,
                "pilot": c.is_pilot,
                "snr_db": c.snr,
                "ber": c.ber,
                "power_level": c.power_level,
                "modulation": c.modulation.as_str(),
                "bits_per_symbol": c.capacity_bits_per_symbol,
                "enabled": c.enabled,
                "trend": c.trend().as_str(),
                "last_update_ms": c.last_update_ms,
            })
        })
        .collect();

    let distribution: serde_json::Map<String, serde_json::Value> = snapshot
        .statistics
        .modulation_distribution
        .iter()
        .map(|(m, n)| (m.as_str().to_string(), serde_json::Value::from(*n)))
        .collect();

    let stats = &snapshot.statistics;
    serde_json::json!({
        "carriers": carriers,
        "total_carriers": stats.total_carriers,
        "enabled_carriers": stats.enabled_carriers,
        "average_snr_db": stats.average_snr,
        "average_ber": stats.average_ber,
        "system_capacity": stats.system_capacity,
        "modulation_distribution": distribution,
        "tick_count": snapshot.tick_count,
        "command_failures": snapshot.command_failures,
        "timestamp_ms": snapshot.timestamp_ms,
    })
    .to_string()
}
