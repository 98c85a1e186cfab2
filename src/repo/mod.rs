//! Typed CRUD over every entity kind.
//!
//! All writes go through parameterized statements; multi-statement writes run
//! inside a single transaction. Empty optional fields are stored as SQL NULL,
//! never as empty strings. Session/message/LoA mutations live in
//! [`sessions`] and [`loa`], the structured records in [`records`], and the
//! optional TELOS/document imports in [`imports`].

pub mod imports;
pub mod loa;
pub mod records;
pub mod sessions;

use chrono::{DateTime, Utc};

/// Parse a stored RFC3339 timestamp back into a UTC instant.
pub(crate) fn parse_utc(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Map empty or whitespace-only optionals to None so they land as SQL NULL.
pub(crate) fn none_if_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optionals_become_none() {
        assert_eq!(none_if_blank(None), None);
        assert_eq!(none_if_blank(Some("")), None);
        assert_eq!(none_if_blank(Some("   ")), None);
        assert_eq!(none_if_blank(Some(" x ")), Some("x"));
    }

    #[test]
    fn parse_utc_round_trips() {
        let now = Utc::now();
        let parsed = parse_utc(now.to_rfc3339()).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }
}
