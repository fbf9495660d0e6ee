use kubedev_core::ResourceType;

/// Parsed search input: typed filters plus free-text terms.
///
/// `ns:NAME` keeps one namespace, `k:TYPE` / `type:TYPE` keeps resource types
/// (repeatable, OR-ed). Everything else is fuzzy-matched term by term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub namespace: Option<String>,
    pub kinds: Vec<ResourceType>,
    /// A `k:` value that names no known type; such a query matches nothing.
    pub unknown_kind: bool,
    pub terms: Vec<String>,
}

impl Query {
    pub fn parse(q: &str) -> Self {
        let mut out = Query::default();
        for tok in q.split_whitespace() {
            if let Some(rest) = tok.strip_prefix("ns:") {
                if !rest.is_empty() {
                    out.namespace = Some(rest.to_string());
                }
                continue;
            }
            if let Some(rest) = tok.strip_prefix("k:").or_else(|| tok.strip_prefix("type:")) {
                if !rest.is_empty() {
                    match rest.parse::<ResourceType>() {
                        Ok(k) => out.kinds.push(k),
                        Err(_) => out.unknown_kind = true,
                    }
                }
                continue;
            }
            out.terms.push(tok.to_string());
        }
        out
    }

    /// No filters and no terms.
    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.kinds.is_empty() && !self.unknown_kind && self.terms.is_empty()
    }
}
