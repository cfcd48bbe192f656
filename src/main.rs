//! mxstat — operating-system load monitor.
//!
//! Run with:  `RUST_LOG=info mxstat [path/to/mxstat.toml]`

use anyhow::{Context, Result};
use mx_config::{ConfigWatcher, MxConfig, ReportFormat};
use mx_core::OsSnapshot;
use mx_system::memory::format_bytes;
use mx_system::{MonitorOptions, OperatingSystemMonitor};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging — RUST_LOG controls verbosity (default: info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("mxstat v{} starting", env!("CARGO_PKG_VERSION"));

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(mx_config::default_path);
    let mut config = mx_config::load(&path).context("loading configuration")?;
    let (_watcher, mut reloads) = ConfigWatcher::spawn(&path);

    loop {
        let mut snapshots = start(&config)?;

        loop {
            tokio::select! {
                Some(snapshot) = snapshots.recv() => {
                    let written = report(&mut io::stdout().lock(), &config, &snapshot);
                    if let Err(e) = written {
                        if e.kind() == io::ErrorKind::BrokenPipe {
                            info!("stdout closed; shutting down");
                            return Ok(());
                        }
                        return Err(e).context("writing report");
                    }
                }
                Some(()) = reloads.recv() => match mx_config::load(&path) {
                    Ok(new) => {
                        info!("configuration reloaded from {}", path.display());
                        config = new;
                        break;
                    }
                    Err(e) => error!("keeping previous configuration: {e}"),
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Build a fresh monitor for `config` and start polling it.
fn start(config: &MxConfig) -> Result<mpsc::Receiver<OsSnapshot>> {
    let options = MonitorOptions {
        minimum_interval_ns:    config.sampling.minimum_interval_ns(),
        cpu_load_compatibility: config.report.cpu_load_compatibility,
    };
    let monitor = OperatingSystemMonitor::new(&options).context("creating monitor")?;
    info!(
        interval_ms = config.sampling.interval_ms,
        processors = monitor.available_processors(),
        "monitor started"
    );
    Ok(mx_system::spawn_monitor(
        monitor,
        config.sampling.interval(),
        config.sampling.history,
    ))
}

fn report(out: &mut impl Write, config: &MxConfig, snapshot: &OsSnapshot) -> io::Result<()> {
    match config.report.format {
        ReportFormat::Json => {
            serde_json::to_writer(&mut *out, snapshot).map_err(io::Error::from)?;
            writeln!(out)?;
        }
        ReportFormat::Text => writeln!(out, "{}", render_text(snapshot))?,
    }
    out.flush()
}

fn percent(load: f64) -> String {
    if load < 0.0 {
        return format!("n/a({load})");
    }
    format!("{:.1}%", load * 100.0)
}

fn render_text(s: &OsSnapshot) -> String {
    let avg = s
        .system_cpu_average
        .map(percent)
        .unwrap_or_else(|| "-".to_string());
    let online = s
        .online_processors
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    let rss = s
        .process
        .map_or_else(|| "-".to_string(), |p| format_bytes(p.physical_memory));
    format!(
        "{} cpus={}/{} sys={} avg={} proc={} rss={} load={:.2}/{:.2}/{:.2} mem={}/{} swap={}/{}",
        s.taken_at.format("%H:%M:%S"),
        s.available_processors,
        online,
        percent(s.system_cpu_load),
        avg,
        percent(s.process_cpu_load),
        rss,
        s.load_average.one,
        s.load_average.five,
        s.load_average.fifteen,
        format_bytes(s.memory.total_physical.saturating_sub(s.memory.available_physical)),
        format_bytes(s.memory.total_physical),
        format_bytes(s.memory.total_swap.saturating_sub(s.memory.free_swap)),
        format_bytes(s.memory.total_swap),
    )
}
