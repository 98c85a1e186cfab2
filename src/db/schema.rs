//! SQL DDL for all engine tables.
//!
//! Defines the entity tables (`sessions`, `messages`, `decisions`,
//! `learnings`, `breadcrumbs`, `loa_entries`, `telos_entries`, `documents`),
//! the `embeddings` vector table, `schema_meta`, and one FTS5
//! external-content index per searchable table, kept in sync by triggers.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Entity-table DDL.
const SCHEMA_SQL: &str = r#"
-- Conversations
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT,
    project TEXT,
    cwd TEXT,
    branch TEXT,
    model TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project);

-- Conversation turns, ordered within a session by (ts, id)
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    session_ref TEXT NOT NULL,
    ts TEXT NOT NULL,
    role TEXT NOT NULL CHECK(role IN ('user','assistant','system')),
    content TEXT NOT NULL,
    project TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_ref);
CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);

-- Structured records
CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    session_ref TEXT,
    category TEXT,
    project TEXT,
    decision TEXT NOT NULL,
    reasoning TEXT,
    alternatives TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','superseded','reverted'))
);

CREATE TABLE IF NOT EXISTS learnings (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    session_ref TEXT,
    category TEXT,
    project TEXT,
    problem TEXT NOT NULL,
    solution TEXT,
    prevention TEXT,
    tags TEXT
);

CREATE TABLE IF NOT EXISTS breadcrumbs (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    session_ref TEXT,
    content TEXT NOT NULL,
    category TEXT,
    project TEXT,
    importance INTEGER NOT NULL DEFAULT 5 CHECK(importance BETWEEN 1 AND 10),
    expires_at TEXT
);

-- Curated extracts; a forest via parent, over message-id ranges
CREATE TABLE IF NOT EXISTS loa_entries (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    extract TEXT NOT NULL,
    range_start INTEGER,
    range_end INTEGER,
    parent INTEGER REFERENCES loa_entries(id),
    session_ref TEXT,
    project TEXT,
    tags TEXT,
    message_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_loa_parent ON loa_entries(parent);
CREATE INDEX IF NOT EXISTS idx_loa_range ON loa_entries(range_start, range_end);

-- Optional purpose-framework entries
CREATE TABLE IF NOT EXISTS telos_entries (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL CHECK(type IN ('identity','problem','mission','goal','challenge','strategy','project','skill','aspiration','metric','other')),
    category TEXT,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    parent_code TEXT,
    source_file TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Optional imported files
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('diary','reference','wisdom','plan','memory','enterprise','other')),
    content TEXT NOT NULL,
    summary TEXT,
    size_bytes INTEGER NOT NULL,
    file_modified_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Vectors: one row per (source_kind, source_id), LE-f32 blob
CREATE TABLE IF NOT EXISTS embeddings (
    id INTEGER PRIMARY KEY,
    source_kind TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(source_kind, source_id)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// FTS5 external-content indexes, one per searchable table, plus the
/// insert/update/delete triggers that keep them in 1:1 correspondence with
/// their base rows.
const FTS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content, project,
    content='messages', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content, project)
    VALUES (new.id, new.content, new.project);
END;
CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content, project)
    VALUES ('delete', old.id, old.content, old.project);
END;
CREATE TRIGGER IF NOT EXISTS messages_fts_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content, project)
    VALUES ('delete', old.id, old.content, old.project);
    INSERT INTO messages_fts(rowid, content, project)
    VALUES (new.id, new.content, new.project);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS decisions_fts USING fts5(
    decision, reasoning, project,
    content='decisions', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS decisions_fts_ai AFTER INSERT ON decisions BEGIN
    INSERT INTO decisions_fts(rowid, decision, reasoning, project)
    VALUES (new.id, new.decision, new.reasoning, new.project);
END;
CREATE TRIGGER IF NOT EXISTS decisions_fts_ad AFTER DELETE ON decisions BEGIN
    INSERT INTO decisions_fts(decisions_fts, rowid, decision, reasoning, project)
    VALUES ('delete', old.id, old.decision, old.reasoning, old.project);
END;
CREATE TRIGGER IF NOT EXISTS decisions_fts_au AFTER UPDATE ON decisions BEGIN
    INSERT INTO decisions_fts(decisions_fts, rowid, decision, reasoning, project)
    VALUES ('delete', old.id, old.decision, old.reasoning, old.project);
    INSERT INTO decisions_fts(rowid, decision, reasoning, project)
    VALUES (new.id, new.decision, new.reasoning, new.project);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS learnings_fts USING fts5(
    problem, solution, tags, project,
    content='learnings', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS learnings_fts_ai AFTER INSERT ON learnings BEGIN
    INSERT INTO learnings_fts(rowid, problem, solution, tags, project)
    VALUES (new.id, new.problem, new.solution, new.tags, new.project);
END;
CREATE TRIGGER IF NOT EXISTS learnings_fts_ad AFTER DELETE ON learnings BEGIN
    INSERT INTO learnings_fts(learnings_fts, rowid, problem, solution, tags, project)
    VALUES ('delete', old.id, old.problem, old.solution, old.tags, old.project);
END;
CREATE TRIGGER IF NOT EXISTS learnings_fts_au AFTER UPDATE ON learnings BEGIN
    INSERT INTO learnings_fts(learnings_fts, rowid, problem, solution, tags, project)
    VALUES ('delete', old.id, old.problem, old.solution, old.tags, old.project);
    INSERT INTO learnings_fts(rowid, problem, solution, tags, project)
    VALUES (new.id, new.problem, new.solution, new.tags, new.project);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS breadcrumbs_fts USING fts5(
    content, category, project,
    content='breadcrumbs', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS breadcrumbs_fts_ai AFTER INSERT ON breadcrumbs BEGIN
    INSERT INTO breadcrumbs_fts(rowid, content, category, project)
    VALUES (new.id, new.content, new.category, new.project);
END;
CREATE TRIGGER IF NOT EXISTS breadcrumbs_fts_ad AFTER DELETE ON breadcrumbs BEGIN
    INSERT INTO breadcrumbs_fts(breadcrumbs_fts, rowid, content, category, project)
    VALUES ('delete', old.id, old.content, old.category, old.project);
END;
CREATE TRIGGER IF NOT EXISTS breadcrumbs_fts_au AFTER UPDATE ON breadcrumbs BEGIN
    INSERT INTO breadcrumbs_fts(breadcrumbs_fts, rowid, content, category, project)
    VALUES ('delete', old.id, old.content, old.category, old.project);
    INSERT INTO breadcrumbs_fts(rowid, content, category, project)
    VALUES (new.id, new.content, new.category, new.project);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS loa_fts USING fts5(
    title, description, extract, tags, project,
    content='loa_entries', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS loa_fts_ai AFTER INSERT ON loa_entries BEGIN
    INSERT INTO loa_fts(rowid, title, description, extract, tags, project)
    VALUES (new.id, new.title, new.description, new.extract, new.tags, new.project);
END;
CREATE TRIGGER IF NOT EXISTS loa_fts_ad AFTER DELETE ON loa_entries BEGIN
    INSERT INTO loa_fts(loa_fts, rowid, title, description, extract, tags, project)
    VALUES ('delete', old.id, old.title, old.description, old.extract, old.tags, old.project);
END;
CREATE TRIGGER IF NOT EXISTS loa_fts_au AFTER UPDATE ON loa_entries BEGIN
    INSERT INTO loa_fts(loa_fts, rowid, title, description, extract, tags, project)
    VALUES ('delete', old.id, old.title, old.description, old.extract, old.tags, old.project);
    INSERT INTO loa_fts(rowid, title, description, extract, tags, project)
    VALUES (new.id, new.title, new.description, new.extract, new.tags, new.project);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS telos_fts USING fts5(
    code, type, title, content, category,
    content='telos_entries', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS telos_fts_ai AFTER INSERT ON telos_entries BEGIN
    INSERT INTO telos_fts(rowid, code, type, title, content, category)
    VALUES (new.id, new.code, new.type, new.title, new.content, new.category);
END;
CREATE TRIGGER IF NOT EXISTS telos_fts_ad AFTER DELETE ON telos_entries BEGIN
    INSERT INTO telos_fts(telos_fts, rowid, code, type, title, content, category)
    VALUES ('delete', old.id, old.code, old.type, old.title, old.content, old.category);
END;
CREATE TRIGGER IF NOT EXISTS telos_fts_au AFTER UPDATE ON telos_entries BEGIN
    INSERT INTO telos_fts(telos_fts, rowid, code, type, title, content, category)
    VALUES ('delete', old.id, old.code, old.type, old.title, old.content, old.category);
    INSERT INTO telos_fts(rowid, code, type, title, content, category)
    VALUES (new.id, new.code, new.type, new.title, new.content, new.category);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    title, type, content, summary, path,
    content='documents', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS documents_fts_ai AFTER INSERT ON documents BEGIN
    INSERT INTO documents_fts(rowid, title, type, content, summary, path)
    VALUES (new.id, new.title, new.type, new.content, new.summary, new.path);
END;
CREATE TRIGGER IF NOT EXISTS documents_fts_ad AFTER DELETE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, type, content, summary, path)
    VALUES ('delete', old.id, old.title, old.type, old.content, old.summary, old.path);
END;
CREATE TRIGGER IF NOT EXISTS documents_fts_au AFTER UPDATE ON documents BEGIN
    INSERT INTO documents_fts(documents_fts, rowid, title, type, content, summary, path)
    VALUES ('delete', old.id, old.title, old.type, old.content, old.summary, old.path);
    INSERT INTO documents_fts(rowid, title, type, content, summary, path)
    VALUES (new.id, new.title, new.type, new.content, new.summary, new.path);
END;
"#;

/// Initialize all tables, indexes, and triggers. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(FTS_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = fresh();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for t in [
            "sessions",
            "messages",
            "decisions",
            "learnings",
            "breadcrumbs",
            "loa_entries",
            "telos_entries",
            "documents",
            "embeddings",
            "schema_meta",
        ] {
            assert!(tables.contains(&t.to_string()), "missing table {t}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = fresh();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn fts_triggers_track_insert_and_delete() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO decisions (created_at, decision, project) VALUES ('2026-01-01T00:00:00Z', 'Use sqlite for storage', 'demo')",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM decisions_fts WHERE decisions_fts MATCH 'sqlite'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM decisions WHERE id = 1", []).unwrap();
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM decisions_fts WHERE decisions_fts MATCH 'sqlite'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }

    #[test]
    fn fts_triggers_track_update() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO learnings (created_at, problem) VALUES ('2026-01-01T00:00:00Z', 'segfault in parser')",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE learnings SET problem = 'overflow in lexer' WHERE id = 1",
            [],
        )
        .unwrap();

        let old_hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM learnings_fts WHERE learnings_fts MATCH 'segfault'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(old_hits, 0);

        let new_hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM learnings_fts WHERE learnings_fts MATCH 'overflow'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(new_hits, 1);
    }

    #[test]
    fn breadcrumb_importance_is_range_checked() {
        let conn = fresh();
        let err = conn.execute(
            "INSERT INTO breadcrumbs (created_at, content, importance) VALUES ('2026-01-01T00:00:00Z', 'x', 11)",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn embeddings_unique_per_source() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO embeddings (source_kind, source_id, model, dimensions, vector, created_at) \
             VALUES ('decisions', 1, 'm', 2, x'0000803f0000803f', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO embeddings (source_kind, source_id, model, dimensions, vector, created_at) \
             VALUES ('decisions', 1, 'm', 2, x'0000803f0000803f', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(dup.is_err());
    }
}
