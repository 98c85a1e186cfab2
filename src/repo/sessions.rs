//! Session and message persistence.
//!
//! Sessions are keyed by a unique external id (the transcript's own session
//! id). Re-ingesting a session goes through [`delete_session_cascade`],
//! which removes the old messages and any LoA entries whose ranges fall
//! entirely inside the deleted id span, children first.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{Message, NewMessage, NewSession, Role, Session};
use crate::repo::parse_utc;

/// Create a session row. Fails with [`Error::Duplicate`] when the external
/// id already exists.
pub fn create_session(conn: &Connection, session: &NewSession) -> Result<i64> {
    let external_id = session.external_id.trim();
    if external_id.is_empty() {
        return Err(Error::InvalidInput("session external_id is empty".into()));
    }

    let started_at = session.started_at.unwrap_or_else(chrono::Utc::now);
    let inserted = conn.execute(
        "INSERT INTO sessions (external_id, started_at, ended_at, summary, project, cwd, branch, model) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            external_id,
            started_at.to_rfc3339(),
            session.ended_at.map(|t| t.to_rfc3339()),
            crate::repo::none_if_blank(session.summary.as_deref()),
            crate::repo::none_if_blank(session.project.as_deref()),
            crate::repo::none_if_blank(session.cwd.as_deref()),
            crate::repo::none_if_blank(session.branch.as_deref()),
            crate::repo::none_if_blank(session.model.as_deref()),
        ],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::Duplicate(format!("session {external_id}")))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn session_exists(conn: &Connection, external_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sessions WHERE external_id = ?1",
        params![external_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn get_session(conn: &Connection, external_id: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, external_id, started_at, ended_at, summary, project, cwd, branch, model \
             FROM sessions WHERE external_id = ?1",
            params![external_id],
            map_session,
        )
        .optional()?;
    Ok(session)
}

/// Set `ended_at` and `summary`, the only mutable session fields.
pub fn finish_session(
    conn: &Connection,
    external_id: &str,
    ended_at: chrono::DateTime<chrono::Utc>,
    summary: Option<&str>,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE sessions SET ended_at = ?1, summary = COALESCE(?2, summary) WHERE external_id = ?3",
        params![
            ended_at.to_rfc3339(),
            crate::repo::none_if_blank(summary),
            external_id
        ],
    )?;
    if rows == 0 {
        return Err(Error::InvalidInput(format!(
            "no session with external id {external_id}"
        )));
    }
    Ok(())
}

/// Insert a batch of messages in one transaction. Returns the count inserted.
pub fn add_messages_batch(conn: &mut Connection, messages: &[NewMessage]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut count = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO messages (session_ref, ts, role, content, project) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for msg in messages {
            stmt.execute(params![
                msg.session_ref,
                msg.ts.to_rfc3339(),
                msg.role.as_str(),
                msg.content,
                crate::repo::none_if_blank(msg.project.as_deref()),
            ])?;
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Messages of one session, ordered by `(ts, id)`.
pub fn session_messages(conn: &Connection, external_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_ref, ts, role, content, project \
         FROM messages WHERE session_ref = ?1 ORDER BY ts, id",
    )?;
    let messages = stmt
        .query_map(params![external_id], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Delete a session, its messages, and every LoA entry whose range lies
/// entirely inside the deleted messages' id span (descendants first, so the
/// parent FK never dangles). Entries that only partially overlap the span
/// survive. One transaction; returns the number of messages deleted.
pub fn delete_session_cascade(conn: &mut Connection, external_id: &str) -> Result<usize> {
    let tx = conn.transaction()?;

    let span: Option<(i64, i64)> = tx
        .query_row(
            "SELECT MIN(id), MAX(id) FROM messages WHERE session_ref = ?1",
            params![external_id],
            |row| {
                let min: Option<i64> = row.get(0)?;
                let max: Option<i64> = row.get(1)?;
                Ok(min.zip(max))
            },
        )
        .optional()?
        .flatten();

    if let Some((min_id, max_id)) = span {
        let contained: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM loa_entries \
                 WHERE range_start IS NOT NULL AND range_end IS NOT NULL \
                   AND range_start >= ?1 AND range_end <= ?2",
            )?;
            let rows = stmt
                .query_map(params![min_id, max_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut deleted = HashSet::new();
        for id in contained {
            delete_loa_subtree(&tx, id, &mut deleted)?;
        }
    }

    let message_count = tx.execute(
        "DELETE FROM messages WHERE session_ref = ?1",
        params![external_id],
    )?;
    tx.execute(
        "DELETE FROM sessions WHERE external_id = ?1",
        params![external_id],
    )?;

    tx.commit()?;
    Ok(message_count)
}

/// Depth-first delete of a LoA entry and all its descendants.
fn delete_loa_subtree(tx: &Transaction, id: i64, deleted: &mut HashSet<i64>) -> Result<()> {
    if !deleted.insert(id) {
        return Ok(());
    }
    let children: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM loa_entries WHERE parent = ?1")?;
        let rows = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    for child in children {
        delete_loa_subtree(tx, child, deleted)?;
    }
    tx.execute("DELETE FROM loa_entries WHERE id = ?1", params![id])?;
    Ok(())
}

pub(crate) fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        external_id: row.get(1)?,
        started_at: parse_utc(row.get(2)?)?,
        ended_at: row.get::<_, Option<String>>(3)?.map(parse_utc).transpose()?,
        summary: row.get(4)?,
        project: row.get(5)?,
        cwd: row.get(6)?,
        branch: row.get(7)?,
        model: row.get(8)?,
    })
}

pub(crate) fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    Ok(Message {
        id: row.get(0)?,
        session_ref: row.get(1)?,
        ts: parse_utc(row.get(2)?)?,
        role: Role::from_str(&role_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        content: row.get(4)?,
        project: row.get(5)?,
    })
}
