//! Library-of-Alexandria entries: curated extracts over message spans.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::{LoaEntry, Message, NewLoaEntry};
use crate::repo::parse_utc;
use crate::repo::sessions::map_message;

/// Messages not yet covered by any LoA entry, plus the id span they occupy.
#[derive(Debug)]
pub struct MessageSpan {
    pub messages: Vec<Message>,
    pub start_id: Option<i64>,
    pub end_id: Option<i64>,
}

/// Create a LoA entry. The caller-supplied range is trusted; no deep
/// validation beyond `range_start ≤ range_end`.
pub fn create_loa_entry(conn: &Connection, entry: &NewLoaEntry) -> Result<i64> {
    if entry.title.trim().is_empty() {
        return Err(Error::InvalidInput("loa title is empty".into()));
    }
    if entry.extract.trim().is_empty() {
        return Err(Error::InvalidInput("loa extract is empty".into()));
    }
    if let (Some(start), Some(end)) = (entry.range_start, entry.range_end) {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "loa range is inverted: {start} > {end}"
            )));
        }
    }

    conn.execute(
        "INSERT INTO loa_entries (created_at, title, description, extract, range_start, range_end, parent, session_ref, project, tags, message_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            chrono::Utc::now().to_rfc3339(),
            entry.title.trim(),
            crate::repo::none_if_blank(entry.description.as_deref()),
            entry.extract,
            entry.range_start,
            entry.range_end,
            entry.parent,
            crate::repo::none_if_blank(entry.session_ref.as_deref()),
            crate::repo::none_if_blank(entry.project.as_deref()),
            crate::repo::none_if_blank(entry.tags.as_deref()),
            entry.message_count,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_loa(conn: &Connection, id: i64) -> Result<LoaEntry> {
    conn.query_row(
        "SELECT id, created_at, title, description, extract, range_start, range_end, parent, session_ref, project, tags, message_count \
         FROM loa_entries WHERE id = ?1",
        params![id],
        map_loa,
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "loa", id })
}

/// Most recent entries, newest first.
pub fn loa_list(conn: &Connection, limit: usize) -> Result<Vec<LoaEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, title, description, extract, range_start, range_end, parent, session_ref, project, tags, message_count \
         FROM loa_entries ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit as i64], map_loa)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// The quotable source messages of an entry: `id ∈ [range_start, range_end]`,
/// ordered by `(ts, id)`. Entries without a range quote nothing.
pub fn loa_messages(conn: &Connection, loa_id: i64) -> Result<Vec<Message>> {
    let entry = get_loa(conn, loa_id)?;
    let (Some(start), Some(end)) = (entry.range_start, entry.range_end) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT id, session_ref, ts, role, content, project \
         FROM messages WHERE id BETWEEN ?1 AND ?2 ORDER BY ts, id",
    )?;
    let messages = stmt
        .query_map(params![start, end], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Messages after the last captured LoA range (all messages when no entry
/// has a range yet), ordered by timestamp. `limit` keeps only the tail.
pub fn messages_since_last_loa(conn: &Connection, limit: Option<usize>) -> Result<MessageSpan> {
    let cutoff: Option<i64> = conn.query_row(
        "SELECT MAX(range_end) FROM loa_entries WHERE range_end IS NOT NULL",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = match cutoff {
        Some(_) => conn.prepare(
            "SELECT id, session_ref, ts, role, content, project \
             FROM messages WHERE id > ?1 ORDER BY ts, id",
        )?,
        None => conn.prepare(
            "SELECT id, session_ref, ts, role, content, project \
             FROM messages ORDER BY ts, id",
        )?,
    };

    let mut messages: Vec<Message> = match cutoff {
        Some(c) => stmt
            .query_map(params![c], map_message)?
            .collect::<std::result::Result<_, _>>()?,
        None => stmt
            .query_map([], map_message)?
            .collect::<std::result::Result<_, _>>()?,
    };

    if let Some(n) = limit {
        if messages.len() > n {
            messages.drain(..messages.len() - n);
        }
    }

    let start_id = messages.iter().map(|m| m.id).min();
    let end_id = messages.iter().map(|m| m.id).max();

    Ok(MessageSpan {
        messages,
        start_id,
        end_id,
    })
}

fn map_loa(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoaEntry> {
    Ok(LoaEntry {
        id: row.get(0)?,
        created_at: parse_utc(row.get(1)?)?,
        title: row.get(2)?,
        description: row.get(3)?,
        extract: row.get(4)?,
        range_start: row.get(5)?,
        range_end: row.get(6)?,
        parent: row.get(7)?,
        session_ref: row.get(8)?,
        project: row.get(9)?,
        tags: row.get(10)?,
        message_count: row.get(11)?,
    })
}
