//! KubeDev search: in-RAM fuzzy index over normalized cluster resources.
//! Rebuilt from scratch per trigger; there is no incremental insert/delete.

#![forbid(unsafe_code)]

use std::time::Instant;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use kubedev_core::{normalize, NormalizeError, RawResourceSet, ResourceType, SearchableRecord};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

mod query;

pub use query::Query;

pub type DocId = u32;

/// Added to a term's score when it equals a field exactly (ignoring case), so
/// exact names outrank partial matches.
const EXACT_BONUS: i64 = 1_000;

/// Record field a query term matched against. All fields weigh the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Namespace,
    Type,
}

impl Field {
    const ALL: [Field; 3] = [Field::Name, Field::Namespace, Field::Type];

    pub fn text(self, rec: &SearchableRecord) -> &str {
        match self {
            Field::Name => &rec.name,
            Field::Namespace => &rec.namespace,
            Field::Type => rec.kind.tag(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Hit {
    pub doc: DocId,
    pub score: f32,
    /// Matched character positions, per field.
    pub matched: SmallVec<[(Field, usize); 16]>,
}

impl Hit {
    pub fn positions(&self, field: Field) -> impl Iterator<Item = usize> + '_ {
        self.matched.iter().filter(move |(f, _)| *f == field).map(|(_, i)| *i)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SearchDebugInfo {
    pub total: usize,
    pub after_ns: usize,
    pub after_kind: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOpts {
    pub max_candidates: Option<usize>,
    pub min_score: Option<f32>,
}

#[derive(Debug, Default)]
pub struct Index {
    records: Vec<SearchableRecord>,
    // Postings hold ascending doc positions.
    ns_post: FxHashMap<String, Vec<usize>>,
    kind_post: FxHashMap<ResourceType, Vec<usize>>,
}

impl Index {
    /// Build over `records`; their order is the tie-break order.
    pub fn build(records: Vec<SearchableRecord>) -> Self {
        let started = Instant::now();
        let mut ns_post: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut kind_post: FxHashMap<ResourceType, Vec<usize>> = FxHashMap::default();
        for (i, r) in records.iter().enumerate() {
            ns_post.entry(r.namespace.clone()).or_default().push(i);
            kind_post.entry(r.kind).or_default().push(i);
        }
        metrics::gauge!("search_index_docs", records.len() as f64);
        metrics::histogram!("search_index_build_ms", started.elapsed().as_secs_f64() * 1_000.0);
        debug!(docs = records.len(), namespaces = ns_post.len(), "search index built");
        Self { records, ns_post, kind_post }
    }

    /// Normalize a raw set and index the result.
    pub fn from_set(set: &RawResourceSet) -> Result<Self, NormalizeError> {
        Ok(Self::build(normalize(set)?))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, doc: DocId) -> Option<&SearchableRecord> {
        self.records.get(doc as usize)
    }

    pub fn records(&self) -> &[SearchableRecord] {
        &self.records
    }

    pub fn search(&self, q: &str, limit: usize) -> Vec<Hit> {
        self.search_with_debug_opts(q, limit, SearchOpts::default()).0
    }

    pub fn search_with_opts(&self, q: &str, limit: usize, opts: SearchOpts) -> Vec<Hit> {
        self.search_with_debug_opts(q, limit, opts).0
    }

    pub fn search_with_debug(&self, q: &str, limit: usize) -> (Vec<Hit>, SearchDebugInfo) {
        self.search_with_debug_opts(q, limit, SearchOpts::default())
    }

    pub fn search_with_debug_opts(&self, q: &str, limit: usize, opts: SearchOpts) -> (Vec<Hit>, SearchDebugInfo) {
        let started = Instant::now();
        let query = Query::parse(q);
        let mut dbg = SearchDebugInfo { total: self.records.len(), ..Default::default() };
        if query.is_empty() || query.unknown_kind {
            return (Vec::new(), dbg);
        }

        let mut candidates: Vec<usize> = match query.namespace.as_deref() {
            Some(ns) => self.ns_post.get(ns).cloned().unwrap_or_default(),
            None => (0..self.records.len()).collect(),
        };
        dbg.after_ns = candidates.len();

        if !query.kinds.is_empty() {
            let mut allowed: Vec<usize> = query
                .kinds
                .iter()
                .filter_map(|k| self.kind_post.get(k))
                .flatten()
                .copied()
                .collect();
            allowed.sort_unstable();
            allowed.dedup();
            candidates = intersect_sorted(&candidates, &allowed);
        }
        dbg.after_kind = candidates.len();

        if let Some(maxc) = opts.max_candidates {
            candidates.truncate(maxc);
        }
        metrics::histogram!("search_candidates", candidates.len() as f64);

        let matcher = SkimMatcherV2::default().ignore_case();
        let mut hits: Vec<Hit> = Vec::new();
        for doc in candidates {
            let Some((score, matched)) = score_record(&matcher, &self.records[doc], &query.terms) else {
                continue;
            };
            let score = score as f32;
            if opts.min_score.map(|m| score >= m).unwrap_or(true) {
                hits.push(Hit { doc: doc as DocId, score, matched });
            }
        }
        dbg.matched = hits.len();

        // Score desc, then record order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc.cmp(&b.doc)));
        hits.truncate(limit);
        metrics::histogram!("search_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
        (hits, dbg)
    }
}

/// Every term must match some field; a term scores by its best field.
fn score_record(
    matcher: &SkimMatcherV2,
    rec: &SearchableRecord,
    terms: &[String],
) -> Option<(i64, SmallVec<[(Field, usize); 16]>)> {
    let mut total = 0i64;
    let mut matched = SmallVec::new();
    for term in terms {
        let mut best: Option<(i64, Field, Vec<usize>)> = None;
        for field in Field::ALL {
            let text = field.text(rec);
            let Some((mut score, idx)) = matcher.fuzzy_indices(text, term) else { continue };
            if text.eq_ignore_ascii_case(term) {
                score += EXACT_BONUS;
            }
            if best.as_ref().map_or(true, |(b, _, _)| score > *b) {
                best = Some((score, field, idx));
            }
        }
        let (score, field, idx) = best?;
        total += score;
        matched.extend(idx.into_iter().map(|i| (field, i)));
    }
    Some((total, matched))
}

fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut i = 0usize;
    let mut j = 0usize;
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => { out.push(a[i]); i += 1; j += 1; }
        }
    }
    out
}
