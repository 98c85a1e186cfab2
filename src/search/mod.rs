//! Search across entity kinds: lexical ([`lexical`]), semantic, and hybrid
//! RRF fusion ([`hybrid`]).
//!
//! Results carry a rendered preview so callers never need a second fetch:
//! messages truncate their content, decisions/learnings/breadcrumbs project
//! their lead column, LoA entries render `"{title}: {extract…}"`, TELOS
//! entries `"{code}: {title}"`, and documents a highlighted FTS snippet.

pub mod hybrid;
pub mod lexical;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::model::SearchKind;

/// Which retrieval list(s) produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Fts,
    Vec,
    Both,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fts => "fts",
            Self::Vec => "vec",
            Self::Both => "both",
        }
    }
}

/// One search result, tagged with its kind and origin.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub kind: SearchKind,
    pub id: i64,
    /// Rendered preview; see the module docs for the per-kind projection.
    pub content: String,
    pub project: Option<String>,
    pub created_at: String,
    /// FTS rank (lower is better) for lexical hits, cosine similarity for
    /// semantic hits, fused RRF score for hybrid hits.
    pub score: f64,
    pub source: MatchSource,
}

/// Dedup identity across retrieval lists.
pub(crate) fn hit_key(kind: SearchKind, id: i64) -> String {
    format!("{}:{}", kind.as_str(), id)
}

/// Truncate to `max_chars` characters on a char boundary, appending an
/// ellipsis when anything was cut.
pub(crate) fn truncate_preview(content: &str, max_chars: usize) -> String {
    let mut indices = content.char_indices();
    match indices.nth(max_chars) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

/// Fetch the rendered preview for a row found by the vector scan (no FTS
/// match available, so documents fall back to their leading content).
pub(crate) fn fetch_preview(
    conn: &Connection,
    kind: SearchKind,
    id: i64,
) -> Result<Option<(String, Option<String>, String)>> {
    let row: Option<(String, Option<String>, String)> = match kind {
        SearchKind::Messages => conn
            .query_row(
                "SELECT content, project, ts FROM messages WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .map(|(content, project, ts): (String, Option<String>, String)| {
                (truncate_preview(&content, 200), project, ts)
            }),
        SearchKind::Decisions => conn
            .query_row(
                "SELECT decision, project, created_at FROM decisions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?,
        SearchKind::Learnings => conn
            .query_row(
                "SELECT problem, project, created_at FROM learnings WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?,
        SearchKind::Breadcrumbs => conn
            .query_row(
                "SELECT content, project, created_at FROM breadcrumbs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?,
        SearchKind::Loa => conn
            .query_row(
                "SELECT title, extract, project, created_at FROM loa_entries WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .map(|(title, extract, project, created_at)| {
                (loa_preview(&title, &extract), project, created_at)
            }),
        SearchKind::Telos => conn
            .query_row(
                "SELECT code, title, created_at FROM telos_entries WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .map(|(code, title, created_at)| (format!("{code}: {title}"), None, created_at)),
        SearchKind::Documents => conn
            .query_row(
                "SELECT title, content, created_at FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .map(|(title, content, created_at)| {
                (
                    format!("{title}: {}", truncate_preview(&content, 200)),
                    None,
                    created_at,
                )
            }),
    };
    Ok(row)
}

/// `"{title}: {first_200_chars_of_extract}"`.
pub(crate) fn loa_preview(title: &str, extract: &str) -> String {
    let lead: String = extract.chars().take(200).collect();
    format!("{title}: {lead}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_preview_appends_ellipsis() {
        assert_eq!(truncate_preview("short", 80), "short");
        let long = "a".repeat(100);
        let cut = truncate_preview(&long, 80);
        assert_eq!(cut.len(), 83);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn hit_key_is_kind_qualified() {
        assert_eq!(hit_key(SearchKind::Decisions, 7), "decisions:7");
        assert_eq!(hit_key(SearchKind::Loa, 7), "loa_entries:7");
    }

    #[test]
    fn loa_preview_caps_extract() {
        let preview = loa_preview("cap", &"x".repeat(500));
        assert_eq!(preview.len(), "cap: ".len() + 200);
        assert!(preview.starts_with("cap: "));
    }
}
