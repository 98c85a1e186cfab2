//! Database lifecycle: open, initialize, permissions, transactions.
//!
//! The store is a single SQLite file in WAL mode with foreign keys enforced.
//! [`init_database`] creates or upgrades it; [`open_database`] refuses to run
//! against a path that was never initialized. Both chmod the data file and
//! its WAL/SHM sidecars to owner-only.

pub mod migrations;
pub mod schema;

use rusqlite::{Connection, Transaction};
use std::path::Path;

use crate::error::{Error, Result};

/// Open an existing database. Fails with [`Error::NotInitialized`] if the
/// file does not exist; only `init` may create it.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotInitialized(path.to_path_buf()));
    }
    open_inner(path, false)
}

/// Create or upgrade the database at the given path. Idempotent. Returns the
/// connection and whether the file was newly created.
pub fn init_database(path: impl AsRef<Path>) -> Result<(Connection, bool)> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let created = !path.exists();
    open_inner(path, true).map(|conn| (conn, created))
}

fn open_inner(path: &Path, init: bool) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL for concurrent readers; FK integrity; wait on locks briefly
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", "5000")?;

    if init {
        schema::init_schema(&conn)?;
    } else {
        // Refuse files that were never initialized through us
        let has_meta: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_meta'",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Err(Error::NotInitialized(path.to_path_buf()));
        }
    }

    migrations::run_migrations(&conn)?;

    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        return Err(Error::Integrity(integrity));
    }

    restrict_permissions(path);

    tracing::debug!(path = %path.display(), "database ready");
    Ok(conn)
}

/// Chmod the database and its sidecar files to 0600. Missing sidecars are
/// fine; the WAL may not exist until the first write.
fn restrict_permissions(db_path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut targets = vec![db_path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut os = db_path.as_os_str().to_owned();
            os.push(suffix);
            targets.push(os.into());
        }
        for target in targets {
            if target.exists() {
                if let Err(e) =
                    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(path = %target.display(), error = %e, "failed to restrict permissions");
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = db_path;
}

/// Run `f` inside an exclusive write transaction. Any error from `f` rolls
/// the whole transaction back.
pub fn with_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Open a fresh in-memory database with the full schema applied. For tests
/// and embedding into other harnesses.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
