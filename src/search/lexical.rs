//! Full-text search over the per-kind FTS5 indexes.
//!
//! The user's query is handed to FTS5 MATCH verbatim, so the native
//! operators (AND/OR/NOT, `prefix*`, "phrase match") work. If FTS5 rejects
//! the string as a syntax error, the query is retried with every term
//! quoted, which turns stray punctuation into plain terms.

use rusqlite::{params, Connection};

use super::{MatchSource, SearchHit};
use crate::error::{Error, Result};
use crate::model::SearchKind;

/// Union search over the requested kinds: per-kind FTS query with optional
/// project filter, top `2·limit` per kind, merged by rank ascending (FTS5
/// rank is "lower is better"), truncated to `limit`.
pub fn lexical_search(
    conn: &Connection,
    query: &str,
    kinds: &[SearchKind],
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidInput("search query is empty".into()));
    }

    let mut merged: Vec<SearchHit> = Vec::new();
    for &kind in kinds {
        let hits = match search_kind(conn, kind, query, project, limit * 2) {
            Ok(hits) => hits,
            Err(Error::Sqlite(rusqlite::Error::SqliteFailure(_, _))) => {
                // Likely an FTS5 syntax error from free-form input; retry
                // with each term quoted.
                let escaped = escape_fts_query(query);
                if escaped.is_empty() {
                    Vec::new()
                } else {
                    search_kind(conn, kind, &escaped, project, limit * 2)?
                }
            }
            Err(e) => return Err(e),
        };
        merged.extend(hits);
    }

    merged.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    Ok(merged)
}

/// Issue one FTS query against a single kind's index.
fn search_kind(
    conn: &Connection,
    kind: SearchKind,
    match_expr: &str,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    // (fts table, preview select, timestamp column, has project column)
    let (fts, preview, ts_col, has_project) = match kind {
        SearchKind::Messages => (
            "messages_fts",
            "b.content".to_string(),
            "b.ts",
            true,
        ),
        SearchKind::Decisions => ("decisions_fts", "b.decision".to_string(), "b.created_at", true),
        SearchKind::Learnings => ("learnings_fts", "b.problem".to_string(), "b.created_at", true),
        SearchKind::Breadcrumbs => {
            ("breadcrumbs_fts", "b.content".to_string(), "b.created_at", true)
        }
        SearchKind::Loa => (
            "loa_fts",
            "b.title || ': ' || substr(b.extract, 1, 200)".to_string(),
            "b.created_at",
            true,
        ),
        SearchKind::Telos => (
            "telos_fts",
            "b.code || ': ' || b.title".to_string(),
            "b.created_at",
            false,
        ),
        SearchKind::Documents => (
            // content is column 2 of documents_fts (title, type, content, summary, path)
            "documents_fts",
            format!("snippet({}, 2, '**', '**', '…', 12)", "documents_fts"),
            "b.created_at",
            false,
        ),
    };

    let project = project.filter(|p| !p.trim().is_empty() && has_project);
    let project_clause = if project.is_some() { "AND b.project = ?2" } else { "" };
    let limit_param = if project.is_some() { "?3" } else { "?2" };

    // The FTS table keeps its real name: `tbl MATCH ?` needs it unaliased.
    let sql = format!(
        "SELECT {fts}.rowid, {preview}, {project_col}, {ts_col}, {fts}.rank \
         FROM {fts} JOIN {base} b ON b.id = {fts}.rowid \
         WHERE {fts} MATCH ?1 {project_clause} \
         ORDER BY {fts}.rank LIMIT {limit_param}",
        base = kind.as_str(),
        project_col = if has_project { "b.project" } else { "NULL" },
    );

    let mut stmt = conn.prepare(&sql)?;
    let map_row = move |row: &rusqlite::Row<'_>| {
        let content: String = row.get(1)?;
        Ok(SearchHit {
            kind,
            id: row.get(0)?,
            content: match kind {
                SearchKind::Messages => super::truncate_preview(&content, 200),
                _ => content,
            },
            project: row.get(2)?,
            created_at: row.get(3)?,
            score: row.get(4)?,
            source: MatchSource::Fts,
        })
    };

    let hits = match project {
        Some(p) => stmt
            .query_map(params![match_expr, p, limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![match_expr, limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(hits)
}

/// Quote every whitespace-delimited term so FTS5 treats the input as plain
/// terms with implicit AND. Strips embedded quotes first.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::repo::records::{add_decision, add_learning, DecisionFields, LearningFields};

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    #[test]
    fn finds_decisions_by_keyword() {
        let conn = test_db();
        add_decision(
            &conn,
            "Use embedded store",
            &DecisionFields {
                reasoning: Some("Simpler deploy"),
                project: Some("demo"),
                ..Default::default()
            },
        )
        .unwrap();

        let hits = lexical_search(&conn, "embedded", &SearchKind::ALL, None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, SearchKind::Decisions);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[0].content, "Use embedded store");
        assert_eq!(hits[0].source, MatchSource::Fts);
    }

    #[test]
    fn native_not_operator_works() {
        let conn = test_db();
        add_decision(&conn, "cache with redis", &DecisionFields::default()).unwrap();
        add_decision(&conn, "cache with memcached", &DecisionFields::default()).unwrap();
        add_decision(&conn, "evaluate redis OR memcached", &DecisionFields::default()).unwrap();

        let hits =
            lexical_search(&conn, "redis NOT memcached", &[SearchKind::Decisions], None, 10)
                .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "cache with redis");
    }

    #[test]
    fn malformed_query_falls_back_to_quoted_terms() {
        let conn = test_db();
        add_learning(
            &conn,
            "borrow checker fight in engine.rs",
            &LearningFields::default(),
        )
        .unwrap();

        // Bare parens are an FTS5 syntax error; the fallback quotes them away
        let hits = lexical_search(&conn, "engine.rs (", &[SearchKind::Learnings], None, 10);
        assert!(hits.is_ok());
    }

    #[test]
    fn project_filter_restricts_results() {
        let conn = test_db();
        add_decision(
            &conn,
            "shared naming convention",
            &DecisionFields {
                project: Some("alpha"),
                ..Default::default()
            },
        )
        .unwrap();
        add_decision(
            &conn,
            "shared naming convention",
            &DecisionFields {
                project: Some("beta"),
                ..Default::default()
            },
        )
        .unwrap();

        let hits =
            lexical_search(&conn, "naming", &[SearchKind::Decisions], Some("alpha"), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].project.as_deref(), Some("alpha"));
    }

    #[test]
    fn merged_results_respect_limit() {
        let conn = test_db();
        for i in 0..5 {
            add_decision(&conn, &format!("widget decision {i}"), &DecisionFields::default())
                .unwrap();
            add_learning(&conn, &format!("widget learning {i}"), &LearningFields::default())
                .unwrap();
        }

        let hits = lexical_search(&conn, "widget", &SearchKind::ALL, None, 4).unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn empty_query_is_invalid() {
        let conn = test_db();
        let err = lexical_search(&conn, "  ", &SearchKind::ALL, None, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn escape_quotes_each_term() {
        assert_eq!(escape_fts_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(escape_fts_query("  spaces  "), "\"spaces\"");
        assert_eq!(escape_fts_query(""), "");
    }
}
