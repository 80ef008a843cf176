//! Hybrid search: vector ranking followed by distance threshold and row
//! predicate filtering.
//!
//! The index is asked for more candidates than `k` so that rows rejected by
//! the filter do not leave the result short. When filtering still leaves fewer
//! than `k` hits, the query is repeated once with twice the over-fetch factor
//! and twice the ef.

use std::time::Instant;

use ahash::AHashSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::vector::index::hnsw::HnswIndex;
use crate::vector::search::VectorSearchResult;
use crate::vector::search::control::SearchControl;

/// Number of re-queries allowed after the first attempt.
const MAX_RETRIES: usize = 1;

/// Predicate over row identifiers, evaluated by the owner of the rows.
pub trait RowFilter: Send + Sync {
    fn matches(&self, id: u64) -> bool;
}

impl<F> RowFilter for F
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn matches(&self, id: u64) -> bool {
        self(id)
    }
}

/// Filter admitting an explicit set of row ids.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: AHashSet<u64>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u64> for AllowList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl RowFilter for AllowList {
    fn matches(&self, id: u64) -> bool {
        self.contains(id)
    }
}

/// Parameters of a hybrid query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchRequest {
    pub query: Vec<f32>,
    pub k: usize,
    /// Search width; the index default when `None`.
    #[serde(default)]
    pub ef: Option<usize>,
    /// Results farther than this are dropped.
    #[serde(default)]
    pub distance_threshold: Option<f32>,
    /// Over-fetch multiplier; the index default when `None`.
    #[serde(default)]
    pub overfetch_factor: Option<usize>,
}

impl HybridSearchRequest {
    pub fn new(query: Vec<f32>, k: usize) -> Self {
        Self {
            query,
            k,
            ef: None,
            distance_threshold: None,
            overfetch_factor: None,
        }
    }

    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = Some(factor);
        self
    }
}

/// Outcome of one filtering pass.
struct FilterPass {
    hits: Vec<VectorSearchResult>,
    /// A candidate was dropped for exceeding the threshold. Candidates are
    /// ascending, so a wider fetch cannot add anything within it.
    threshold_reached: bool,
}

fn apply_filters(
    candidates: Vec<VectorSearchResult>,
    k: usize,
    threshold: Option<f32>,
    filter: Option<&dyn RowFilter>,
) -> FilterPass {
    let mut hits = Vec::with_capacity(k);
    let mut threshold_reached = false;

    for candidate in candidates {
        if threshold.is_some_and(|t| candidate.distance > t) {
            threshold_reached = true;
            break;
        }
        if filter.is_some_and(|f| !f.matches(candidate.id)) {
            continue;
        }
        hits.push(candidate);
        if hits.len() == k {
            break;
        }
    }

    FilterPass {
        hits,
        threshold_reached,
    }
}

/// Run `request` against `index`, recording it as one search.
pub(crate) fn execute(
    index: &HnswIndex,
    request: &HybridSearchRequest,
    filter: Option<&dyn RowFilter>,
    control: &SearchControl,
) -> Result<Vec<VectorSearchResult>> {
    let start = Instant::now();
    let outcome = run(index, request, filter, control);
    index.metrics_collector().record(start.elapsed(), &outcome);
    outcome
}

fn run(
    index: &HnswIndex,
    request: &HybridSearchRequest,
    filter: Option<&dyn RowFilter>,
    control: &SearchControl,
) -> Result<Vec<VectorSearchResult>> {
    if request.distance_threshold.is_some_and(f32::is_nan) {
        return Err(VectraError::invalid_operation(
            "distance threshold must be a number",
        ));
    }

    let k = request.k;
    let mut factor = request
        .overfetch_factor
        .unwrap_or(index.config().overfetch_factor)
        .max(1);
    let mut ef = request.ef.unwrap_or(index.config().ef_search);

    let mut attempt = 0;
    loop {
        let live = index.len();
        if k == 0 || live == 0 {
            // Still rejects a malformed query.
            index.search_unrecorded(&request.query, 0, ef, control)?;
            return Ok(Vec::new());
        }

        let fetch = k.saturating_mul(factor).min(live);
        let candidates =
            index.search_unrecorded(&request.query, fetch, ef.max(fetch), control)?;
        let fetched = candidates.len();

        let pass = apply_filters(candidates, k, request.distance_threshold, filter);
        let exhausted = fetched >= live || pass.threshold_reached;
        if pass.hits.len() >= k || exhausted || attempt >= MAX_RETRIES {
            return Ok(pass.hits);
        }

        attempt += 1;
        factor = factor.saturating_mul(2);
        ef = ef.saturating_mul(2);
        debug!(
            "hybrid search kept {} of {k} after filtering {fetched} candidates, retrying with overfetch {factor} and ef {ef}",
            pass.hits.len()
        );
    }
}
