//! Resident-memory sampling for an external process, by name.
//!
//! The compiler may fork helpers, so every matching process is summed.

use std::time::Duration;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle returned by [`monitor_process_memory`]; dropping it without
/// calling [`cancel`](MonitorHandle::cancel) leaves the sampler running
/// until its task is dropped with the runtime.
pub struct MonitorHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop future sampling. An in-flight sample completes; no further
    /// ticks are scheduled. Consumes the handle, so cancelling twice is
    /// impossible by construction.
    pub async fn cancel(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

/// Sample total resident memory (bytes) of all processes whose name
/// contains `process_name`, every `interval`, invoking `callback` with each
/// sample. Ticks with no matching process are skipped.
pub fn monitor_process_memory(
    process_name: &str,
    interval: Duration,
    callback: impl Fn(u64) + Send + 'static,
) -> MonitorHandle {
    let process_name = process_name.to_string();
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        // First sample after one full interval, matching the external
        // process's startup time.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut system = System::new();

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    system.refresh_processes_specifics(
                        ProcessesToUpdate::All,
                        ProcessRefreshKind::new().with_memory(),
                    );
                    let total: u64 = system
                        .processes()
                        .values()
                        .filter(|p| p.name().to_string_lossy().contains(&process_name))
                        .map(|p| p.memory())
                        .sum();

                    if total == 0 {
                        debug!("Process {} not found, skipping sample", process_name);
                    } else {
                        callback(total);
                    }
                }
            }
        }
    });

    MonitorHandle { stop_tx, task }
}
