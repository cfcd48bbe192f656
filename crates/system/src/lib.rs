pub mod cpu;
pub mod estimator;
pub mod memory;
pub mod monitor;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use cpu::CpuHistory;
pub use estimator::CpuLoadEstimator;
pub use monitor::{MonitorOptions, OperatingSystemMonitor};
pub use source::{ProcessCpuSource, SampleError, SampleSource, SystemCpuSource};

use mx_core::OsSnapshot;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// Spawn a background Tokio task that takes a snapshot from `monitor` every
/// `interval` and forwards it through the returned channel.
///
/// `history` is the number of valid system loads averaged into each
/// snapshot's `system_cpu_average`. The task stops automatically when the
/// receiver is dropped.
pub fn spawn_monitor(
    monitor: OperatingSystemMonitor,
    interval: Duration,
    history: usize,
) -> mpsc::Receiver<OsSnapshot> {
    let (tx, rx) = mpsc::channel(4);
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut history = CpuHistory::new(history);
        let mut ticker  = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let snapshot = monitor.snapshot(&mut history);

            if tx.send(snapshot).await.is_err() {
                tracing::debug!("snapshot receiver dropped; stopping monitor");
                break;
            }
        }
    });

    rx
}
