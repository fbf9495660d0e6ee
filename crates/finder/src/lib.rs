//! KubeDev finder: the header search box without the view layer.
//!
//! Focusing the box issues a [`QueryTrigger`]; the [`SearchWorker`] rebuilds
//! the index from the latest payload off the interactive thread and answers
//! with the same trigger. Only the answer to the most recently issued trigger
//! is applied. Typing re-queries the installed index synchronously (after the
//! debounce window) and selecting a row yields a [`NavTarget`].

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use kubedev_core::{NavTarget, NormalizeError, SearchableRecord};
use kubedev_search::{Hit, Index};
use kubedev_store::SetSource;
use tracing::{debug, warn};

mod config;
mod worker;

pub use config::FinderConfig;
pub use worker::{QueryTrigger, SearchWorker, WorkerResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderState {
    /// Never focused.
    Idle,
    /// Focused, waiting for the index of `trigger`; dropdown closed.
    Focused { trigger: QueryTrigger },
    /// Index for `trigger` installed; dropdown shows the ranked rows.
    OpenWithResults { trigger: QueryTrigger },
    /// Blurred. Late answers are ignored.
    Closed,
}

/// One dropdown row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResultRow {
    pub record: SearchableRecord,
    pub hit: Hit,
}

pub struct Finder {
    worker: SearchWorker,
    config: FinderConfig,
    state: FinderState,
    next_trigger: u64,
    // Most recently issued trigger; the only one whose answer is applied.
    latest: Option<QueryTrigger>,
    index: Option<Arc<Index>>,
    input: String,
    changed_at: Option<Instant>,
    rows: Vec<ResultRow>,
    highlighted: Option<usize>,
    last_error: Option<NormalizeError>,
}

impl Finder {
    pub fn new(worker: SearchWorker, config: FinderConfig) -> Self {
        Self {
            worker,
            config,
            state: FinderState::Idle,
            next_trigger: 0,
            latest: None,
            index: None,
            input: String::new(),
            changed_at: None,
            rows: Vec::new(),
            highlighted: None,
            last_error: None,
        }
    }

    /// Spawn a dedicated worker over `source`. Must run inside a tokio runtime.
    pub fn spawn<S: SetSource>(source: S, config: FinderConfig) -> Self {
        Self::new(SearchWorker::spawn(source), config)
    }

    pub fn state(&self) -> FinderState {
        self.state
    }

    /// Dropdown visible: results installed and at least one row.
    pub fn is_open(&self) -> bool {
        matches!(self.state, FinderState::OpenWithResults { .. }) && !self.rows.is_empty()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn results(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    /// Error of the current trigger's build, if it failed.
    pub fn last_error(&self) -> Option<&NormalizeError> {
        self.last_error.as_ref()
    }

    pub fn latest_trigger(&self) -> Option<QueryTrigger> {
        self.latest
    }

    /// Input gained focus: ask the worker for a fresh index.
    pub fn focus(&mut self) -> QueryTrigger {
        self.next_trigger += 1;
        let trigger = QueryTrigger::new(self.next_trigger);
        self.latest = Some(trigger);
        self.state = FinderState::Focused { trigger };
        // The installed index belongs to the previous trigger.
        self.index = None;
        self.last_error = None;
        self.rows.clear();
        self.highlighted = None;
        self.worker.request(trigger);
        debug!(trigger = trigger.value(), "search focused");
        trigger
    }

    /// Input lost focus. Pending work is left to finish and be ignored.
    pub fn blur(&mut self) {
        self.state = FinderState::Closed;
        self.rows.clear();
        self.highlighted = None;
        self.changed_at = None;
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.changed_at = Some(Instant::now());
        if self.config.debounce.is_zero() {
            self.requery();
        }
    }

    /// Drain worker answers and run a due debounced query. Never blocks.
    /// Returns true when the visible rows may have changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(resp) = self.worker.try_recv() {
            changed |= self.apply(resp);
        }
        changed | self.requery_if_due()
    }

    /// Like [`Finder::poll`], but waits up to `timeout` for a worker answer.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let mut changed = match self.worker.recv_timeout(timeout) {
            Some(resp) => self.apply(resp),
            None => false,
        };
        changed |= self.poll();
        changed
    }

    /// Apply one worker answer. Answers for any trigger other than the latest,
    /// or arriving after blur, are dropped silently.
    pub fn apply(&mut self, resp: WorkerResponse) -> bool {
        if self.latest != Some(resp.trigger) {
            metrics::counter!("search_stale_results_total", 1u64);
            debug!(trigger = resp.trigger.value(), latest = ?self.latest.map(QueryTrigger::value), "stale search result discarded");
            return false;
        }
        let trigger = match self.state {
            FinderState::Focused { trigger } | FinderState::OpenWithResults { trigger } if trigger == resp.trigger => trigger,
            _ => {
                debug!(trigger = resp.trigger.value(), "search result arrived after blur; ignored");
                return false;
            }
        };
        match resp.result {
            Ok(index) => {
                self.index = Some(index);
                self.last_error = None;
                self.state = FinderState::OpenWithResults { trigger };
                self.run_query();
            }
            Err(e) => {
                warn!(trigger = trigger.value(), error = %e, "search unavailable for this trigger");
                self.index = None;
                self.rows.clear();
                self.highlighted = None;
                self.last_error = Some(e);
                self.state = FinderState::Focused { trigger };
            }
        }
        true
    }

    pub fn highlight_next(&mut self) {
        let len = self.rows.len();
        if len == 0 {
            return;
        }
        self.highlighted = Some(match self.highlighted {
            Some(cur) => (cur + 1) % len,
            None => 0,
        });
    }

    pub fn highlight_prev(&mut self) {
        let len = self.rows.len();
        if len == 0 {
            return;
        }
        self.highlighted = Some(match self.highlighted {
            Some(0) | None => len - 1,
            Some(cur) => cur - 1,
        });
    }

    /// Choose row `i`. Only valid while the dropdown has results; otherwise a
    /// no-op. The input takes the record name and the dropdown closes.
    pub fn select(&mut self, i: usize) -> Option<NavTarget> {
        let FinderState::OpenWithResults { trigger } = self.state else {
            return None;
        };
        let record = self.rows.get(i)?.record.clone();
        let target = record.nav_target();
        self.input = record.name;
        self.changed_at = None;
        self.rows.clear();
        self.highlighted = None;
        self.state = FinderState::Focused { trigger };
        metrics::counter!("search_selections_total", 1u64, "type" => target.kind.tag());
        debug!(path = %target.path(), "search selection");
        Some(target)
    }

    pub fn select_highlighted(&mut self) -> Option<NavTarget> {
        self.select(self.highlighted?)
    }

    fn requery_if_due(&mut self) -> bool {
        match self.changed_at {
            Some(t0) if t0.elapsed() >= self.config.debounce => self.requery(),
            _ => false,
        }
    }

    /// Re-run the text against the installed index. Not a new trigger.
    fn requery(&mut self) -> bool {
        self.changed_at = None;
        match self.state {
            FinderState::OpenWithResults { .. } => {
                self.run_query();
                true
            }
            // Typing again after a selection reopens the dropdown on the same index.
            FinderState::Focused { trigger } if self.index.is_some() && self.last_error.is_none() => {
                self.state = FinderState::OpenWithResults { trigger };
                self.run_query();
                true
            }
            _ => false,
        }
    }

    fn run_query(&mut self) {
        let Some(index) = self.index.as_ref() else {
            self.rows.clear();
            return;
        };
        self.rows = index
            .search(&self.input, self.config.limit)
            .into_iter()
            .filter_map(|hit| index.record(hit.doc).cloned().map(|record| ResultRow { record, hit }))
            .collect();
        self.highlighted = if self.rows.is_empty() { None } else { Some(0) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubedev_core::{RawResourceList, RawResourceSet, ResourceType};
    use kubedev_store::StoreHandle;

    const WAIT: Duration = Duration::from_secs(5);

    fn payload(pods: &[(&str, &str)]) -> RawResourceSet {
        let items = pods
            .iter()
            .map(|(ns, n)| serde_json::json!({ "metadata": { "namespace": ns, "name": n } }))
            .collect();
        RawResourceSet::default().with(ResourceType::Pod, RawResourceList::new(items))
    }

    fn finder(set: RawResourceSet) -> Finder {
        Finder::spawn(StoreHandle::with_set(set), FinderConfig::default().with_debounce(Duration::ZERO))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn focus_then_results_then_select() {
        let mut f = finder(payload(&[("kube-system", "coredns-1"), ("default", "api-server")]));
        assert_eq!(f.state(), FinderState::Idle);
        f.set_input("coredns");
        let t = f.focus();
        assert_eq!(f.state(), FinderState::Focused { trigger: t });
        assert!(!f.is_open());

        assert!(f.wait(WAIT));
        assert_eq!(f.state(), FinderState::OpenWithResults { trigger: t });
        assert!(f.is_open());
        assert_eq!(f.results()[0].record.name, "coredns-1");

        let target = f.select_highlighted().unwrap();
        assert_eq!(target.path(), "/kube-system/pods/coredns-1/info");
        assert_eq!(f.input(), "coredns-1");
        assert!(!f.is_open());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn typing_requeries_without_new_trigger() {
        let mut f = finder(payload(&[("default", "api-server"), ("default", "api-gateway")]));
        let t = f.focus();
        f.wait(WAIT);
        f.set_input("api-server");
        assert_eq!(f.results()[0].record.name, "api-server");
        f.set_input("gateway");
        assert_eq!(f.results().len(), 1);
        assert_eq!(f.results()[0].record.name, "api-gateway");
        assert_eq!(f.latest_trigger(), Some(t));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn debounce_defers_requery_until_poll() {
        let mut f = Finder::spawn(
            StoreHandle::with_set(payload(&[("default", "alpha"), ("default", "beta")])),
            FinderConfig::default().with_debounce(Duration::from_millis(20)),
        );
        f.set_input("alpha");
        f.focus();
        f.wait(WAIT);
        assert_eq!(f.results().len(), 1);
        f.set_input("beta");
        // still showing the previous rows
        assert_eq!(f.results()[0].record.name, "alpha");
        std::thread::sleep(Duration::from_millis(30));
        assert!(f.poll());
        assert_eq!(f.results()[0].record.name, "beta");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn highlight_wraps() {
        let mut f = finder(payload(&[("d", "web-1"), ("d", "web-2"), ("d", "web-3")]));
        f.set_input("web");
        f.focus();
        f.wait(WAIT);
        assert_eq!(f.highlighted(), Some(0));
        f.highlight_prev();
        assert_eq!(f.highlighted(), Some(2));
        f.highlight_next();
        assert_eq!(f.highlighted(), Some(0));
        f.highlight_next();
        assert_eq!(f.select_highlighted().unwrap().name, "web-2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn select_without_results_is_noop() {
        let mut f = finder(payload(&[("d", "web-1")]));
        assert!(f.select(0).is_none());
        f.set_input("zzz");
        f.focus();
        assert!(f.select(0).is_none());
        f.wait(WAIT);
        assert!(f.results().is_empty());
        assert!(!f.is_open());
        assert!(f.select(0).is_none());
    }
}
