//! Structured records: decisions, learnings, breadcrumbs, plus the
//! recent-listing and stats queries shared by the facade.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{
    Breadcrumb, Decision, DecisionStatus, Learning, SearchKind,
};
use crate::repo::{none_if_blank, parse_utc};

/// Optional fields accepted when recording a decision.
#[derive(Debug, Default, Clone)]
pub struct DecisionFields<'a> {
    pub reasoning: Option<&'a str>,
    pub alternatives: Option<&'a str>,
    pub category: Option<&'a str>,
    pub project: Option<&'a str>,
    pub session_ref: Option<&'a str>,
}

/// Optional fields accepted when recording a learning.
#[derive(Debug, Default, Clone)]
pub struct LearningFields<'a> {
    pub solution: Option<&'a str>,
    pub prevention: Option<&'a str>,
    pub tags: Option<&'a str>,
    pub category: Option<&'a str>,
    pub project: Option<&'a str>,
    pub session_ref: Option<&'a str>,
}

/// Optional fields accepted when dropping a breadcrumb.
#[derive(Debug, Default, Clone)]
pub struct BreadcrumbFields<'a> {
    pub category: Option<&'a str>,
    pub project: Option<&'a str>,
    pub session_ref: Option<&'a str>,
    pub importance: Option<u8>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A compact row for `recent` listings across all kinds.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecentItem {
    pub kind: SearchKind,
    pub id: i64,
    pub created_at: String,
    pub preview: String,
    pub project: Option<String>,
}

/// Row counts per kind plus the database file size.
#[derive(Debug, serde::Serialize)]
pub struct StoreStats {
    pub sessions: u64,
    pub messages: u64,
    pub loa_entries: u64,
    pub decisions: u64,
    pub learnings: u64,
    pub breadcrumbs: u64,
    pub telos_entries: u64,
    pub documents: u64,
    pub embeddings: u64,
    pub db_size_bytes: u64,
}

pub fn add_decision(conn: &Connection, decision: &str, fields: &DecisionFields<'_>) -> Result<i64> {
    let decision = decision.trim();
    if decision.is_empty() {
        return Err(Error::InvalidInput("decision text is empty".into()));
    }

    conn.execute(
        "INSERT INTO decisions (created_at, session_ref, category, project, decision, reasoning, alternatives, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            chrono::Utc::now().to_rfc3339(),
            none_if_blank(fields.session_ref),
            none_if_blank(fields.category),
            none_if_blank(fields.project),
            decision,
            none_if_blank(fields.reasoning),
            none_if_blank(fields.alternatives),
            DecisionStatus::Active.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_learning(conn: &Connection, problem: &str, fields: &LearningFields<'_>) -> Result<i64> {
    let problem = problem.trim();
    if problem.is_empty() {
        return Err(Error::InvalidInput("learning problem is empty".into()));
    }

    conn.execute(
        "INSERT INTO learnings (created_at, session_ref, category, project, problem, solution, prevention, tags) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            chrono::Utc::now().to_rfc3339(),
            none_if_blank(fields.session_ref),
            none_if_blank(fields.category),
            none_if_blank(fields.project),
            problem,
            none_if_blank(fields.solution),
            none_if_blank(fields.prevention),
            none_if_blank(fields.tags),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_breadcrumb(
    conn: &Connection,
    content: &str,
    fields: &BreadcrumbFields<'_>,
) -> Result<i64> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::InvalidInput("breadcrumb content is empty".into()));
    }
    let importance = fields.importance.unwrap_or(5);
    if !(1..=10).contains(&importance) {
        return Err(Error::InvalidInput(format!(
            "importance must be 1..=10, got {importance}"
        )));
    }

    conn.execute(
        "INSERT INTO breadcrumbs (created_at, session_ref, content, category, project, importance, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            chrono::Utc::now().to_rfc3339(),
            none_if_blank(fields.session_ref),
            content,
            none_if_blank(fields.category),
            none_if_blank(fields.project),
            importance as i64,
            fields.expires_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_decision(conn: &Connection, id: i64) -> Result<Decision> {
    conn.query_row(
        "SELECT id, created_at, session_ref, category, project, decision, reasoning, alternatives, status \
         FROM decisions WHERE id = ?1",
        params![id],
        |row| {
            let status: String = row.get(8)?;
            Ok(Decision {
                id: row.get(0)?,
                created_at: parse_utc(row.get(1)?)?,
                session_ref: row.get(2)?,
                category: row.get(3)?,
                project: row.get(4)?,
                decision: row.get(5)?,
                reasoning: row.get(6)?,
                alternatives: row.get(7)?,
                status: DecisionStatus::from_str(&status).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        8,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
            })
        },
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "decision", id })
}

pub fn get_learning(conn: &Connection, id: i64) -> Result<Learning> {
    conn.query_row(
        "SELECT id, created_at, session_ref, category, project, problem, solution, prevention, tags \
         FROM learnings WHERE id = ?1",
        params![id],
        |row| {
            Ok(Learning {
                id: row.get(0)?,
                created_at: parse_utc(row.get(1)?)?,
                session_ref: row.get(2)?,
                category: row.get(3)?,
                project: row.get(4)?,
                problem: row.get(5)?,
                solution: row.get(6)?,
                prevention: row.get(7)?,
                tags: row.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "learning", id })
}

pub fn get_breadcrumb(conn: &Connection, id: i64) -> Result<Breadcrumb> {
    conn.query_row(
        "SELECT id, created_at, session_ref, content, category, project, importance, expires_at \
         FROM breadcrumbs WHERE id = ?1",
        params![id],
        |row| {
            Ok(Breadcrumb {
                id: row.get(0)?,
                created_at: parse_utc(row.get(1)?)?,
                session_ref: row.get(2)?,
                content: row.get(3)?,
                category: row.get(4)?,
                project: row.get(5)?,
                importance: row.get::<_, i64>(6)? as u8,
                expires_at: row
                    .get::<_, Option<String>>(7)?
                    .map(parse_utc)
                    .transpose()?,
            })
        },
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "breadcrumb", id })
}

/// Most-recent listing for any kind, optionally filtered by project.
/// Messages order by `ts`; everything else by `created_at`.
pub fn recent(
    conn: &Connection,
    kind: SearchKind,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<RecentItem>> {
    // (timestamp column, preview column, has project column)
    let (ts_col, preview_col, has_project) = match kind {
        SearchKind::Messages => ("ts", "content", true),
        SearchKind::Decisions => ("created_at", "decision", true),
        SearchKind::Learnings => ("created_at", "problem", true),
        SearchKind::Breadcrumbs => ("created_at", "content", true),
        SearchKind::Loa => ("created_at", "title", true),
        SearchKind::Telos => ("created_at", "title", false),
        SearchKind::Documents => ("created_at", "title", false),
    };

    let project = none_if_blank(project).filter(|_| has_project);
    let sql = match project {
        Some(_) => format!(
            "SELECT id, {ts_col}, {preview_col}, project FROM {table} \
             WHERE project = ?1 ORDER BY {ts_col} DESC, id DESC LIMIT ?2",
            table = kind.as_str(),
        ),
        None if has_project => format!(
            "SELECT id, {ts_col}, {preview_col}, project FROM {table} \
             ORDER BY {ts_col} DESC, id DESC LIMIT ?1",
            table = kind.as_str(),
        ),
        None => format!(
            "SELECT id, {ts_col}, {preview_col}, NULL FROM {table} \
             ORDER BY {ts_col} DESC, id DESC LIMIT ?1",
            table = kind.as_str(),
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let map_row = move |row: &rusqlite::Row<'_>| {
        Ok(RecentItem {
            kind,
            id: row.get(0)?,
            created_at: row.get(1)?,
            preview: row.get(2)?,
            project: row.get(3)?,
        })
    };
    let items = match project {
        Some(p) => stmt
            .query_map(params![p, limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(items)
}

/// Row counts per kind and the database file size.
pub fn store_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StoreStats> {
    let count = |table: &str| -> Result<u64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        Ok(n as u64)
    };

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StoreStats {
        sessions: count("sessions")?,
        messages: count("messages")?,
        loa_entries: count("loa_entries")?,
        decisions: count("decisions")?,
        learnings: count("learnings")?,
        breadcrumbs: count("breadcrumbs")?,
        telos_entries: count("telos_entries")?,
        documents: count("documents")?,
        embeddings: count("embeddings")?,
        db_size_bytes,
    })
}
