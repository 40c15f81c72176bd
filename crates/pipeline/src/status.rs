//! Status reporting: an append-only log mirrored to the blob store.
//!
//! Pipeline stages call [`StatusReporter::log`] fire-and-forget; a
//! background loop uploads the full log whenever it has grown since the
//! last upload. Shutdown drains: [`StatusReporter::stop_flushing`] does not
//! return until every record appended before the call is durably uploaded.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::blob::BlobStore;

/// One persisted log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Seconds since the reporter was created.
    pub time: f64,
}

struct Flusher {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct StatusReporter {
    store: Arc<dyn BlobStore>,
    key: String,
    started: Instant,
    records: Arc<Mutex<Vec<StatusRecord>>>,
    flusher: AsyncMutex<Option<Flusher>>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            started: Instant::now(),
            records: Arc::new(Mutex::new(Vec::new())),
            flusher: AsyncMutex::new(None),
        }
    }

    /// Append a record. Returns immediately; upload happens on the flush
    /// loop's schedule.
    pub fn log(&self, msg: impl Into<String>, data: Option<serde_json::Value>) {
        let record = StatusRecord {
            msg: msg.into(),
            data,
            time: self.started.elapsed().as_secs_f64(),
        };
        debug!("status: {}", record.msg);
        self.records.lock().unwrap().push(record);
    }

    /// Current log contents.
    pub fn snapshot(&self) -> Vec<StatusRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Start the periodic flush loop. A second call while one is running
    /// is a no-op.
    pub async fn start_flushing(&self, interval: Duration) {
        let mut guard = self.flusher.lock().await;
        if guard.is_some() {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let records = Arc::clone(&self.records);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            let mut last_uploaded = 0usize;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        // Drain: one final upload of anything unflushed.
                        flush(&*store, &key, &records, &mut last_uploaded).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        flush(&*store, &key, &records, &mut last_uploaded).await;
                    }
                }
            }
        });

        *guard = Some(Flusher { stop_tx, task });
    }

    /// Stop the flush loop, waiting for the drain flush to finish.
    /// Idempotent; safe to call without a loop running.
    pub async fn stop_flushing(&self) {
        let flusher = self.flusher.lock().await.take();
        if let Some(Flusher { stop_tx, task }) = flusher {
            // The task may have already exited; either way, await it.
            let _ = stop_tx.send(());
            let _ = task.await;
        }
    }
}

/// Upload the full log if it has grown since the last upload. An upload
/// failure is recorded into the log itself and retried on the next tick.
async fn flush(
    store: &dyn BlobStore,
    key: &str,
    records: &Mutex<Vec<StatusRecord>>,
    last_uploaded: &mut usize,
) {
    let (len, body) = {
        let guard = records.lock().unwrap();
        (guard.len(), serde_json::to_value(&*guard))
    };
    if len <= *last_uploaded {
        return;
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Status log serialization failed: {}", e);
            return;
        }
    };

    match store.put_json(key, &body).await {
        Ok(()) => *last_uploaded = len,
        Err(e) => {
            warn!("Status upload failed: {}", e);
            let mut guard = records.lock().unwrap();
            let time = guard.last().map(|r| r.time).unwrap_or(0.0);
            guard.push(StatusRecord {
                msg: format!("Status upload failed: {e}"),
                data: None,
                time,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    fn uploaded_records(store: &MemoryBlobStore, key: &str) -> Vec<StatusRecord> {
        let raw = store.get(key).expect("nothing uploaded");
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_only_on_growth() {
        let store = Arc::new(MemoryBlobStore::new());
        let reporter = StatusReporter::new(store.clone(), "status/req1.json");

        reporter.start_flushing(Duration::from_secs(5)).await;
        reporter.log("Compiling...", None);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.upload_log().len(), 1);

        // Nothing appended: the next two ticks must not re-upload.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.upload_log().len(), 1);

        reporter.log("Setup...", None);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.upload_log().len(), 2);

        reporter.stop_flushing().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_trailing_records() {
        let store = Arc::new(MemoryBlobStore::new());
        let reporter = StatusReporter::new(store.clone(), "status/req2.json");

        reporter.start_flushing(Duration::from_secs(3600)).await;
        reporter.log("first", None);
        reporter.log("last", Some(serde_json::json!({"n": 2})));

        // No tick has fired; stop must still upload everything.
        reporter.stop_flushing().await;

        let records = uploaded_records(&store, "status/req2.json");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].msg, "last");
        assert_eq!(records[1].data.as_ref().unwrap()["n"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let store = Arc::new(MemoryBlobStore::new());
        let reporter = StatusReporter::new(store.clone(), "status/req3.json");

        reporter.start_flushing(Duration::from_secs(5)).await;
        reporter.log("only", None);
        reporter.stop_flushing().await;
        reporter.stop_flushing().await;

        assert_eq!(uploaded_records(&store, "status/req3.json").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stop_uploads_nothing() {
        let store = Arc::new(MemoryBlobStore::new());
        let reporter = StatusReporter::new(store.clone(), "status/req4.json");

        reporter.start_flushing(Duration::from_secs(5)).await;
        reporter.stop_flushing().await;

        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_times_monotonic() {
        let store = Arc::new(MemoryBlobStore::new());
        let reporter = StatusReporter::new(store.clone(), "status/req5.json");

        reporter.log("a", None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        reporter.log("b", None);

        let records = reporter.snapshot();
        assert!(records[0].time <= records[1].time);
    }
}
