use std::time::Duration;

/// Search box settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinderConfig {
    /// Max rows in the dropdown.
    pub limit: usize,
    /// Quiet period after a keystroke before the query re-runs.
    pub debounce: Duration,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self { limit: 10, debounce: Duration::from_millis(80) }
    }
}

impl FinderConfig {
    /// Defaults overridden by `KUBEDEV_SEARCH_LIMIT` and `KUBEDEV_DEBOUNCE_MS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let limit = std::env::var("KUBEDEV_SEARCH_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.limit);
        let debounce = std::env::var("KUBEDEV_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.debounce);
        Self { limit, debounce }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
