#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use kubedev_core::{RawResourceList, RawResourceSet, ResourceType};
use kubedev_kubehub::ResourceFetcher;
use kubedev_store::{refresh_once, spawn_refresh, StoreHandle};

fn set_with(n: usize) -> RawResourceSet {
    let items = (0..n)
        .map(|i| serde_json::json!({ "metadata": { "name": format!("svc-{i}"), "namespace": "default" } }))
        .collect();
    RawResourceSet::default().with(ResourceType::Service, RawResourceList::new(items))
}

/// Second call fails, every other call returns `call + 1` services.
#[derive(Default)]
struct Scripted {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ResourceFetcher for Scripted {
    async fn fetch(&self) -> Result<RawResourceSet> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 1 {
            return Err(anyhow!("apiserver unavailable"));
        }
        Ok(set_with(n + 1))
    }
}

#[tokio::test]
async fn refresh_once_keeps_previous_set_on_error() {
    let store = StoreHandle::new();
    let fetcher = Scripted::default();
    assert_eq!(refresh_once(&fetcher, &store).await.unwrap(), 1);
    assert!(refresh_once(&fetcher, &store).await.is_err());
    assert_eq!(store.epoch(), 1);
    assert_eq!(store.current().total_items(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_loop_publishes_and_skips_failures() {
    let store = StoreHandle::new();
    let mut rx = store.subscribe_epoch();
    let fetcher = Arc::new(Scripted::default());
    let handle = spawn_refresh(fetcher.clone(), store.clone(), Duration::from_secs(30));

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 1);
    assert_eq!(store.current().total_items(), 1);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 2);
    assert_eq!(store.current().total_items(), 3);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    handle.abort();
}
