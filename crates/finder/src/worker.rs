use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kubedev_core::NormalizeError;
use kubedev_search::Index;
use kubedev_store::SetSource;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifies one index rebuild request. Responses carry it back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct QueryTrigger(u64);

impl QueryTrigger {
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct WorkerResponse {
    pub trigger: QueryTrigger,
    pub result: Result<Arc<Index>, NormalizeError>,
}

/// Background task that normalizes the latest payload and builds an index per
/// trigger. Pending triggers are not queued: only the newest one is built.
/// Aborted on drop.
pub struct SearchWorker {
    req_tx: mpsc::UnboundedSender<QueryTrigger>,
    resp_rx: std_mpsc::Receiver<WorkerResponse>,
    task: JoinHandle<()>,
}

impl SearchWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: SetSource>(source: S) -> Self {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel::<QueryTrigger>();
        let (resp_tx, resp_rx) = std_mpsc::channel::<WorkerResponse>();
        let source = Arc::new(source);
        let task = tokio::spawn(async move {
            info!("search worker started");
            while let Some(mut trigger) = req_rx.recv().await {
                while let Ok(newer) = req_rx.try_recv() {
                    debug!(skipped = trigger.value(), newer = newer.value(), "superseded trigger not built");
                    trigger = newer;
                }
                let src = Arc::clone(&source);
                let resp = match tokio::task::spawn_blocking(move || build(src.as_ref(), trigger)).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(trigger = trigger.value(), error = %e, "index build task failed");
                        break;
                    }
                };
                if resp_tx.send(resp).is_err() {
                    break;
                }
            }
            debug!("search worker stopped");
        });
        Self { req_tx, resp_rx, task }
    }

    /// Non-blocking.
    pub fn request(&self, trigger: QueryTrigger) {
        if self.req_tx.send(trigger).is_err() {
            warn!(trigger = trigger.value(), "search worker gone; request dropped");
        }
    }

    pub fn try_recv(&self) -> Option<WorkerResponse> {
        self.resp_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerResponse> {
        self.resp_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn build<S: SetSource>(source: &S, trigger: QueryTrigger) -> WorkerResponse {
    let started = Instant::now();
    let set = source.current();
    let result = Index::from_set(&set).map(Arc::new);
    metrics::counter!("search_worker_builds_total", 1u64);
    metrics::histogram!("search_worker_build_ms", started.elapsed().as_secs_f64() * 1_000.0);
    match &result {
        Ok(idx) => debug!(trigger = trigger.value(), docs = idx.len(), "index ready"),
        Err(e) => warn!(trigger = trigger.value(), error = %e, "index build failed"),
    }
    WorkerResponse { trigger, result }
}
