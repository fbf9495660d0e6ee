#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use kubedev_core::{RawResourceList, RawResourceSet, ResourceType, SearchableRecord};
use kubedev_finder::{Finder, FinderConfig, FinderState, QueryTrigger, SearchWorker, WorkerResponse};
use kubedev_search::Index;
use kubedev_store::StoreHandle;

const WAIT: Duration = Duration::from_secs(5);

fn pods(names: &[&str]) -> RawResourceSet {
    let items = names
        .iter()
        .map(|n| serde_json::json!({ "metadata": { "namespace": "default", "name": n } }))
        .collect();
    RawResourceSet::default().with(ResourceType::Pod, RawResourceList::new(items))
}

fn index_of(names: &[&str]) -> Arc<Index> {
    Arc::new(Index::build(
        names.iter().map(|n| SearchableRecord::new(ResourceType::Pod, "default", *n)).collect(),
    ))
}

fn config() -> FinderConfig {
    FinderConfig::default().with_debounce(Duration::ZERO)
}

fn shown(f: &Finder) -> Vec<String> {
    f.results().iter().map(|r| r.record.name.clone()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn older_trigger_arriving_late_never_overwrites_newer() {
    let mut f = Finder::spawn(StoreHandle::new(), config());
    f.set_input("api");
    let t1 = f.focus();
    let t2 = f.focus();
    assert_ne!(t1, t2);

    assert!(f.apply(WorkerResponse { trigger: t2, result: Ok(index_of(&["api-new"])) }));
    assert_eq!(shown(&f), vec!["api-new"]);

    assert!(!f.apply(WorkerResponse { trigger: t1, result: Ok(index_of(&["api-old"])) }));
    assert_eq!(shown(&f), vec!["api-new"]);
    assert_eq!(f.state(), FinderState::OpenWithResults { trigger: t2 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn older_trigger_arriving_first_is_discarded() {
    let mut f = Finder::spawn(StoreHandle::new(), config());
    f.set_input("api");
    let t1 = f.focus();
    let t2 = f.focus();
    assert!(!f.apply(WorkerResponse { trigger: t1, result: Ok(index_of(&["api-old"])) }));
    assert!(!f.is_open());
    assert_eq!(f.state(), FinderState::Focused { trigger: t2 });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blur_during_build_keeps_dropdown_closed() {
    let mut f = Finder::spawn(StoreHandle::with_set(pods(&["api-server"])), config());
    f.set_input("api");
    f.focus();
    f.blur();
    assert_eq!(f.state(), FinderState::Closed);
    // the worker still answers; the answer must not reopen anything
    assert!(!f.wait(WAIT));
    assert_eq!(f.state(), FinderState::Closed);
    assert!(!f.is_open());
    assert!(f.results().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_payload_shows_no_results() {
    let bad = RawResourceSet::default().with(
        ResourceType::Deployment,
        RawResourceList::new(vec![serde_json::json!({ "spec": { "replicas": 1 } })]),
    );
    let mut f = Finder::spawn(StoreHandle::with_set(bad), config());
    f.set_input("anything");
    let t = f.focus();
    assert!(f.wait(WAIT));
    assert!(f.last_error().is_some());
    assert_eq!(f.state(), FinderState::Focused { trigger: t });
    assert!(f.results().is_empty());
    f.set_input("still nothing");
    assert!(!f.is_open());
    assert!(f.select(0).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refocus_rebuilds_from_current_store() {
    let store = StoreHandle::with_set(pods(&["alpha"]));
    let mut f = Finder::spawn(store.clone(), config());
    f.set_input("beta");
    f.focus();
    f.wait(WAIT);
    assert!(f.results().is_empty());
    f.blur();

    store.replace(pods(&["alpha", "beta"]));
    f.focus();
    f.wait(WAIT);
    assert_eq!(shown(&f), vec!["beta"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_echoes_triggers_and_finishes_with_newest() {
    let worker = SearchWorker::spawn(StoreHandle::with_set(pods(&["a"])));
    for v in 1..=3 {
        worker.request(QueryTrigger::new(v));
    }
    let mut seen = Vec::new();
    while let Some(resp) = worker.recv_timeout(Duration::from_millis(500)) {
        assert!(resp.result.is_ok());
        seen.push(resp.trigger.value());
    }
    assert!(!seen.is_empty() && seen.len() <= 3);
    assert_eq!(seen.last(), Some(&3));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_after_refocus_waits_for_the_new_index() {
    let mut f = Finder::spawn(StoreHandle::new(), config());
    let t1 = f.focus();
    assert!(f.apply(WorkerResponse { trigger: t1, result: Ok(index_of(&["old-api"])) }));
    f.blur();

    let t2 = f.focus();
    f.set_input("api");
    assert_eq!(f.state(), FinderState::Focused { trigger: t2 });
    assert!(!f.is_open());
    assert!(f.results().is_empty());

    assert!(f.apply(WorkerResponse { trigger: t2, result: Ok(index_of(&["api-new"])) }));
    assert_eq!(shown(&f), vec!["api-new"]);
}
