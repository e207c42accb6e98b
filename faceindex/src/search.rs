use std::cmp::Ordering;
use std::time::Instant;

use serde::Serialize;

use crate::norm::{dot, l2_normalize};
use crate::store::IndexStore;

/// A single match from a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    /// Identity key of the matched vector's owner.
    pub person_id: String,

    /// Cosine similarity, clamped to [0, 1] and rounded to 2 decimals.
    pub similarity: f32,

    /// 1-based position within the returned matches.
    pub rank: usize,
}

/// Outcome of a similarity search. An empty match list is a normal
/// result (cold start, or nothing above threshold), never an error.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Matches in descending similarity order.
    pub matches: Vec<SearchMatch>,

    /// Wall-clock scan time in whole milliseconds.
    pub search_time_ms: u64,

    /// Number of stored vectors compared against the query. This is
    /// the full index size: the scan is exhaustive, not index-assisted.
    pub entries_searched: usize,
}

impl SearchResult {
    fn empty() -> Self {
        Self {
            matches: Vec::new(),
            search_time_ms: 0,
            entries_searched: 0,
        }
    }
}

/// Exhaustive top-k cosine search over the store.
///
/// The query is normalized here; stored rows are already unit-norm, so
/// a plain inner product is their cosine similarity. Scores are
/// quantized to 2 decimals before both ranking and the threshold
/// comparison: downstream consumers compare against a threshold, not
/// exact rank order beyond that resolution. Ties go to the
/// lower ordinal position (earlier-registered face) for determinism.
pub(crate) fn run(
    store: &IndexStore,
    query: &[f32],
    top_k: usize,
    threshold: f32,
) -> SearchResult {
    if store.is_empty() || top_k == 0 {
        return SearchResult::empty();
    }

    let start = Instant::now();

    let mut q = query.to_vec();
    l2_normalize(&mut q);

    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(store.len());
    for (pos, row) in store.vectors().iter().enumerate() {
        let raw = dot(&q, row);
        // Non-finite or negative scores are numerical edge cases, not
        // candidates.
        if !raw.is_finite() || raw < 0.0 {
            continue;
        }
        scored.push((pos, round2(raw.clamp(0.0, 1.0))));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(top_k);

    let matches = scored
        .into_iter()
        .filter(|&(_, sim)| sim >= threshold)
        .filter_map(|(pos, sim)| {
            store.identity(pos).map(|id| (id.to_string(), sim))
        })
        .enumerate()
        .map(|(i, (person_id, similarity))| SearchMatch {
            person_id,
            similarity,
            rank: i + 1,
        })
        .collect();

    SearchResult {
        matches,
        search_time_ms: start.elapsed().as_millis() as u64,
        entries_searched: store.len(),
    }
}

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}
