//! Raw listings → flat [`SearchableRecord`]s.

use tracing::{debug, warn};

use crate::{RawResourceSet, ResourceType, SearchableRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// `metadata` missing on a listed item. The cluster API always sets it, so
    /// this is a data problem and not worth retrying.
    #[error("malformed {kind} item at index {index}: missing metadata")]
    MalformedResource { kind: ResourceType, index: usize },
}

/// Flatten every present listing into records.
///
/// Output is sorted by `(namespace, type, name)`; duplicate tuples keep the
/// first occurrence.
pub fn normalize(set: &RawResourceSet) -> Result<Vec<SearchableRecord>, NormalizeError> {
    let mut out = Vec::with_capacity(set.total_items());
    for (kind, list) in set.lists() {
        for (index, item) in list.items.iter().enumerate() {
            out.push(record_from(kind, index, item)?);
        }
    }
    out.sort_by(|a, b| {
        a.namespace
            .cmp(&b.namespace)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.name.cmp(&b.name))
    });
    let before = out.len();
    out.dedup();
    if out.len() != before {
        warn!(dropped = before - out.len(), "duplicate (type, namespace, name) records dropped");
    }
    debug!(records = out.len(), "normalized resource set");
    Ok(out)
}

fn record_from(
    kind: ResourceType,
    index: usize,
    item: &serde_json::Value,
) -> Result<SearchableRecord, NormalizeError> {
    let meta = item
        .get("metadata")
        .and_then(|m| m.as_object())
        .ok_or(NormalizeError::MalformedResource { kind, index })?;
    let field = |key: &str| meta.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string();
    Ok(SearchableRecord { kind, namespace: field("namespace"), name: field("name") })
}
