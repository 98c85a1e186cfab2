//! Persistence and brute-force similarity search for embedding rows.
//!
//! One row per `(source_kind, source_id)`; replacement is an upsert. The
//! scan decodes each blob, computes cosine similarity against the query, and
//! returns the top-k. Rows whose dimensionality differs from the query
//! vector (leftovers from an older model) are skipped with a warning.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;

use super::{blob_to_embedding, cosine_similarity, embedding_to_blob};
use crate::error::Result;
use crate::model::SearchKind;

/// One similarity hit from a vector scan.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub kind: SearchKind,
    pub id: i64,
    pub similarity: f32,
}

/// Counts and sizes reported by `embed stats`.
#[derive(Debug, serde::Serialize)]
pub struct EmbeddingStats {
    pub total: u64,
    pub total_bytes: u64,
    pub by_kind: HashMap<String, u64>,
    pub models: Vec<String>,
}

/// Insert or replace the embedding for a source row.
pub fn upsert_embedding(
    conn: &Connection,
    kind: SearchKind,
    source_id: i64,
    model: &str,
    vector: &[f32],
) -> Result<()> {
    let blob = embedding_to_blob(vector);
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO embeddings (source_kind, source_id, model, dimensions, vector, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(source_kind, source_id) DO UPDATE SET \
             model = excluded.model, \
             dimensions = excluded.dimensions, \
             vector = excluded.vector, \
             created_at = excluded.created_at",
        params![kind.as_str(), source_id, model, vector.len() as i64, blob, now],
    )?;
    Ok(())
}

/// Fetch the stored vector for a source row, if any.
pub fn get_embedding(
    conn: &Connection,
    kind: SearchKind,
    source_id: i64,
) -> Result<Option<Vec<f32>>> {
    let row: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT dimensions, vector FROM embeddings WHERE source_kind = ?1 AND source_id = ?2",
            params![kind.as_str(), source_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((dimensions, blob)) => Ok(Some(blob_to_embedding(&blob, dimensions as usize)?)),
        None => Ok(None),
    }
}

/// Brute-force top-k cosine scan, optionally filtered by source kind.
pub fn vector_search(
    conn: &Connection,
    query: &[f32],
    kind: Option<SearchKind>,
    limit: usize,
) -> Result<Vec<VectorHit>> {
    let sql = match kind {
        Some(_) => {
            "SELECT source_kind, source_id, dimensions, vector FROM embeddings WHERE source_kind = ?1"
        }
        None => "SELECT source_kind, source_id, dimensions, vector FROM embeddings",
    };

    let mut stmt = conn.prepare(sql)?;
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Vec<u8>>(3)?,
        ))
    };
    let rows: Vec<(String, i64, i64, Vec<u8>)> = match kind {
        Some(k) => stmt
            .query_map(params![k.as_str()], map_row)?
            .collect::<std::result::Result<_, _>>()?,
        None => stmt
            .query_map([], map_row)?
            .collect::<std::result::Result<_, _>>()?,
    };

    let mut hits = Vec::new();
    for (kind_str, source_id, dimensions, blob) in rows {
        let Ok(kind) = SearchKind::from_str(&kind_str) else {
            tracing::warn!(kind = %kind_str, id = source_id, "skipping embedding with unknown source kind");
            continue;
        };
        if dimensions as usize != query.len() {
            tracing::warn!(
                kind = %kind_str,
                id = source_id,
                stored = dimensions,
                query = query.len(),
                "skipping embedding with mismatched dimensions"
            );
            continue;
        }
        let vector = blob_to_embedding(&blob, dimensions as usize)?;
        hits.push(VectorHit {
            kind,
            id: source_id,
            similarity: cosine_similarity(&vector, query),
        });
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    Ok(hits)
}

/// Rows of `kind` that still need an embedding, as `(id, text)` pairs. With
/// `force`, every row qualifies. The text is the same projection used at
/// embed time, so backfill and auto-embed agree.
pub fn rows_to_embed(
    conn: &Connection,
    kind: SearchKind,
    limit: usize,
    force: bool,
) -> Result<Vec<(i64, String)>> {
    let projection = match kind {
        SearchKind::Messages => "m.content",
        SearchKind::Decisions => "m.decision || COALESCE(char(10) || m.reasoning, '')",
        SearchKind::Learnings => "m.problem || COALESCE(char(10) || m.solution, '')",
        SearchKind::Breadcrumbs => "m.content",
        SearchKind::Loa => "m.title || char(10) || m.extract",
        SearchKind::Telos => "m.title || char(10) || m.content",
        SearchKind::Documents => "m.title || char(10) || m.content",
    };

    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    };

    let rows = if force {
        let sql = format!(
            "SELECT m.id, {projection} FROM {table} m ORDER BY m.id LIMIT ?1",
            table = kind.as_str(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    } else {
        let sql = format!(
            "SELECT m.id, {projection} FROM {table} m \
             WHERE NOT EXISTS (SELECT 1 FROM embeddings e WHERE e.source_kind = ?1 AND e.source_id = m.id) \
             ORDER BY m.id LIMIT ?2",
            table = kind.as_str(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![kind.as_str(), limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    Ok(rows)
}

/// Aggregate counts for `embed stats`.
pub fn embedding_stats(conn: &Connection) -> Result<EmbeddingStats> {
    let (total, total_bytes): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(LENGTH(vector)), 0) FROM embeddings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut by_kind = HashMap::new();
    let mut stmt = conn.prepare("SELECT source_kind, COUNT(*) FROM embeddings GROUP BY source_kind")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;
    for (k, count) in rows {
        by_kind.insert(k, count as u64);
    }

    let mut stmt = conn.prepare("SELECT DISTINCT model FROM embeddings ORDER BY model")?;
    let models: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    Ok(EmbeddingStats {
        total: total as u64,
        total_bytes: total_bytes as u64,
        by_kind,
        models,
    })
}
