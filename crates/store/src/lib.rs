//! KubeDev store: holds the latest raw search payload and refreshes it.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use arc_swap::ArcSwap;
use kubedev_core::RawResourceSet;
use kubedev_kubehub::ResourceFetcher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read side used by the search worker: the latest payload, captured whole.
pub trait SetSource: Send + Sync + 'static {
    fn current(&self) -> Arc<RawResourceSet>;
}

/// Shared handle to the current payload. Sets are swapped, never mutated in
/// place, so a captured `Arc` stays valid while a newer set is published.
#[derive(Clone)]
pub struct StoreHandle {
    snap: Arc<ArcSwap<RawResourceSet>>,
    epoch_tx: Arc<watch::Sender<u64>>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreHandle {
    pub fn new() -> Self {
        Self::with_set(RawResourceSet::default())
    }

    pub fn with_set(set: RawResourceSet) -> Self {
        let (epoch_tx, _rx) = watch::channel(0u64);
        Self { snap: Arc::new(ArcSwap::from_pointee(set)), epoch_tx: Arc::new(epoch_tx) }
    }

    pub fn current(&self) -> Arc<RawResourceSet> {
        self.snap.load_full()
    }

    /// Publish a new payload; returns the new epoch.
    pub fn replace(&self, set: RawResourceSet) -> u64 {
        let items = set.total_items();
        self.snap.store(Arc::new(set));
        let mut epoch = 0;
        self.epoch_tx.send_modify(|e| {
            *e += 1;
            epoch = *e;
        });
        metrics::gauge!("store_items", items as f64);
        debug!(epoch, items, "resource set replaced");
        epoch
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch_tx.borrow()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }
}

impl SetSource for StoreHandle {
    fn current(&self) -> Arc<RawResourceSet> {
        StoreHandle::current(self)
    }
}

/// Fetch once and publish. On error the previous set stays.
pub async fn refresh_once(fetcher: &dyn ResourceFetcher, store: &StoreHandle) -> Result<u64> {
    let started = Instant::now();
    let set = fetcher.fetch().await?;
    let epoch = store.replace(set);
    metrics::histogram!("store_refresh_ms", started.elapsed().as_secs_f64() * 1_000.0);
    Ok(epoch)
}

/// Spawn a loop refreshing the store every `every` (first fetch immediately).
pub fn spawn_refresh(fetcher: Arc<dyn ResourceFetcher>, store: StoreHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(every_secs = every.as_secs(), "refresh loop started");
        loop {
            ticker.tick().await;
            if let Err(e) = refresh_once(fetcher.as_ref(), &store).await {
                metrics::counter!("store_refresh_errors_total", 1u64);
                warn!(error = ?e, "refresh failed; keeping previous resource set");
            }
        }
    })
}
