//! Forward-only schema versioning.
//!
//! The schema version lives in `schema_meta`. Running against an equal
//! version is a no-op; a database written by a newer binary is refused with
//! [`Error::SchemaTooNew`]. The first real migration will bring back a
//! sequential upgrade loop; at version 1 there is nothing to upgrade from.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Check the stored version against what this binary supports. Idempotent;
/// fails only when the file is from a newer binary.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking schema version");

    if version > CURRENT_SCHEMA_VERSION {
        return Err(Error::SchemaTooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    Ok(())
}
