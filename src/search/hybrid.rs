//! Semantic retrieval and hybrid RRF fusion.
//!
//! These are the synchronous halves of semantic and hybrid search: the
//! caller embeds the query first (an HTTP call that must not run under the
//! store lock) and hands the vector in. Fusion uses Reciprocal Rank Fusion
//! with `k = 60` and zero-based ranks; each fused hit is tagged with the
//! list(s) it came from.

use rusqlite::Connection;
use std::collections::HashMap;

use super::{fetch_preview, hit_key, MatchSource, SearchHit};
use crate::embedding::store::vector_search;
use crate::error::Result;
use crate::model::SearchKind;

/// RRF constant.
const RRF_K: f64 = 60.0;

/// Hybrid search results plus whether the semantic side participated.
#[derive(Debug)]
pub struct HybridResults {
    pub hits: Vec<SearchHit>,
    pub embeddings_available: bool,
}

/// Semantic search over a pre-embedded query vector: scan stored vectors,
/// return the top hits by cosine similarity with rendered previews.
pub fn semantic_from_vector(
    conn: &Connection,
    query_vector: &[f32],
    kind: Option<SearchKind>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let vector_hits = vector_search(conn, query_vector, kind, limit)?;

    let mut hits = Vec::with_capacity(vector_hits.len());
    for vh in vector_hits {
        if let Some((content, project, created_at)) = fetch_preview(conn, vh.kind, vh.id)? {
            hits.push(SearchHit {
                kind: vh.kind,
                id: vh.id,
                content,
                project,
                created_at,
                score: vh.similarity as f64,
                source: MatchSource::Vec,
            });
        }
    }
    Ok(hits)
}

/// Fuse the lexical and semantic lists:
/// `RRF(d) = Σ_list 1 / (k + rank + 1)` with zero-based ranks and identity
/// `"{kind}:{id}"`. Items in both lists add both terms and are tagged
/// [`MatchSource::Both`].
pub fn rrf_fuse(lexical: &[SearchHit], semantic: &[SearchHit], limit: usize) -> Vec<SearchHit> {
    struct Fused {
        hit: SearchHit,
        score: f64,
        in_fts: bool,
        in_vec: bool,
    }

    let mut fused: HashMap<String, Fused> = HashMap::new();

    for (rank, hit) in lexical.iter().enumerate() {
        let score = 1.0 / (RRF_K + rank as f64 + 1.0);
        let entry = fused.entry(hit_key(hit.kind, hit.id)).or_insert_with(|| Fused {
            hit: hit.clone(),
            score: 0.0,
            in_fts: false,
            in_vec: false,
        });
        entry.score += score;
        entry.in_fts = true;
    }

    for (rank, hit) in semantic.iter().enumerate() {
        let score = 1.0 / (RRF_K + rank as f64 + 1.0);
        let entry = fused.entry(hit_key(hit.kind, hit.id)).or_insert_with(|| Fused {
            hit: hit.clone(),
            score: 0.0,
            in_fts: false,
            in_vec: false,
        });
        entry.score += score;
        entry.in_vec = true;
    }

    let mut results: Vec<SearchHit> = fused
        .into_values()
        .map(|f| {
            let source = match (f.in_fts, f.in_vec) {
                (true, true) => MatchSource::Both,
                (true, false) => MatchSource::Fts,
                _ => MatchSource::Vec,
            };
            SearchHit {
                score: f.score,
                source,
                ..f.hit
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}
