//! Engine-wide error taxonomy.
//!
//! Store-level failures ([`Error::NotInitialized`], [`Error::SchemaTooNew`],
//! [`Error::Integrity`]) are fatal; everything else is recoverable at the
//! call site. The binary maps these onto process exit codes.

use std::path::PathBuf;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file does not exist and the caller is not `init`.
    #[error("memory store not initialized at {0} — run `recollect init` first")]
    NotInitialized(PathBuf),

    /// The database was created by a newer binary.
    #[error("database schema version {found} is newer than this binary supports ({supported}) — upgrade recollect")]
    SchemaTooNew { found: u32, supported: u32 },

    /// The database failed its integrity check.
    #[error("database integrity check failed: {0}")]
    Integrity(String),

    /// Empty content, unknown kind, malformed id, and similar caller mistakes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Entity not present.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// Unique constraint violation.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Stored embedding blob length does not match its recorded dimensions.
    #[error("corrupt embedding: expected {expected} bytes, found {actual}")]
    CorruptEmbedding { expected: usize, actual: usize },

    /// Embedding endpoint or LLM extractor unreachable, timed out, or non-2xx.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// External service responded with something we cannot parse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// LLM output is missing the required summary sections.
    #[error("extraction output failed quality gate: {0}")]
    QualityGateFailed(String),

    /// Transcript exceeds the single-pass extractor ceiling.
    #[error("input too large: {chars} chars exceeds the {limit}-char single-pass ceiling")]
    InputTooLarge { chars: usize, limit: usize },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for the CLI: 2 for unrecoverable integrity-class
    /// errors, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Integrity(_) | Error::SchemaTooNew { .. } => 2,
            _ => 1,
        }
    }
}
