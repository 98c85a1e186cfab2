//! Optional imported kinds: TELOS purpose-framework entries and documents.
//!
//! Both are upserts keyed on their natural unique column (`code` for TELOS,
//! `path` for documents) so re-running an import refreshes rather than
//! duplicates.

use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{Document, DocumentType, TelosEntry, TelosType};
use crate::repo::{none_if_blank, parse_utc};

/// Fields for a TELOS entry import.
#[derive(Debug, Clone)]
pub struct NewTelosEntry {
    pub code: String,
    pub entry_type: TelosType,
    pub category: Option<String>,
    pub title: String,
    pub content: String,
    pub parent_code: Option<String>,
    pub source_file: Option<String>,
}

/// Fields for a document import.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub path: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub content: String,
    pub summary: Option<String>,
    pub size_bytes: i64,
    pub file_modified_at: chrono::DateTime<chrono::Utc>,
}

/// Insert or refresh a TELOS entry by code. Returns the row id.
pub fn upsert_telos_entry(conn: &Connection, entry: &NewTelosEntry) -> Result<i64> {
    if entry.code.trim().is_empty() || entry.title.trim().is_empty() {
        return Err(Error::InvalidInput("telos code and title are required".into()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO telos_entries (code, type, category, title, content, parent_code, source_file, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
         ON CONFLICT(code) DO UPDATE SET \
             type = excluded.type, \
             category = excluded.category, \
             title = excluded.title, \
             content = excluded.content, \
             parent_code = excluded.parent_code, \
             source_file = excluded.source_file, \
             updated_at = excluded.updated_at",
        params![
            entry.code.trim(),
            entry.entry_type.as_str(),
            none_if_blank(entry.category.as_deref()),
            entry.title.trim(),
            entry.content,
            none_if_blank(entry.parent_code.as_deref()),
            none_if_blank(entry.source_file.as_deref()),
            now,
        ],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM telos_entries WHERE code = ?1",
        params![entry.code.trim()],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert or refresh a document by path. Returns the row id.
pub fn upsert_document(conn: &Connection, doc: &NewDocument) -> Result<i64> {
    if doc.path.trim().is_empty() || doc.title.trim().is_empty() {
        return Err(Error::InvalidInput("document path and title are required".into()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO documents (path, title, type, content, summary, size_bytes, file_modified_at, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
         ON CONFLICT(path) DO UPDATE SET \
             title = excluded.title, \
             type = excluded.type, \
             content = excluded.content, \
             summary = excluded.summary, \
             size_bytes = excluded.size_bytes, \
             file_modified_at = excluded.file_modified_at, \
             updated_at = excluded.updated_at",
        params![
            doc.path.trim(),
            doc.title.trim(),
            doc.doc_type.as_str(),
            doc.content,
            none_if_blank(doc.summary.as_deref()),
            doc.size_bytes,
            doc.file_modified_at.to_rfc3339(),
            now,
        ],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM documents WHERE path = ?1",
        params![doc.path.trim()],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_telos(conn: &Connection, id: i64) -> Result<TelosEntry> {
    conn.query_row(
        "SELECT id, code, type, category, title, content, parent_code, source_file, created_at, updated_at \
         FROM telos_entries WHERE id = ?1",
        params![id],
        |row| {
            let type_str: String = row.get(2)?;
            Ok(TelosEntry {
                id: row.get(0)?,
                code: row.get(1)?,
                entry_type: TelosType::from_str(&type_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                category: row.get(3)?,
                title: row.get(4)?,
                content: row.get(5)?,
                parent_code: row.get(6)?,
                source_file: row.get(7)?,
                created_at: parse_utc(row.get(8)?)?,
                updated_at: parse_utc(row.get(9)?)?,
            })
        },
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "telos", id })
}

pub fn get_document(conn: &Connection, id: i64) -> Result<Document> {
    conn.query_row(
        "SELECT id, path, title, type, content, summary, size_bytes, file_modified_at, created_at, updated_at \
         FROM documents WHERE id = ?1",
        params![id],
        |row| {
            let type_str: String = row.get(3)?;
            Ok(Document {
                id: row.get(0)?,
                path: row.get(1)?,
                title: row.get(2)?,
                doc_type: DocumentType::from_str(&type_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                content: row.get(4)?,
                summary: row.get(5)?,
                size_bytes: row.get(6)?,
                file_modified_at: parse_utc(row.get(7)?)?,
                created_at: parse_utc(row.get(8)?)?,
                updated_at: parse_utc(row.get(9)?)?,
            })
        },
    )
    .optional()?
    .ok_or(Error::NotFound { kind: "document", id })
}
