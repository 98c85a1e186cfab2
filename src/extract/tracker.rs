//! Per-transcript extraction state.
//!
//! One record per absolute transcript path, persisted as camelCase JSON so
//! the session-end hook (a separate process) can read the same file. The
//! whole file is rewritten on every update; the batch scanner is the only
//! writer in cron mode.
//!
//! Record lifecycle:
//!
//! ```text
//!    (absent)
//!       │ begin
//!       ▼
//!   extracting ──success──► extracted ──grew>50%──► extracting
//!       │                      ▲
//!     failure                  │ retry_after reached
//!       ▼                      │
//!    cooldown ────────────────►┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Hours a failed extraction waits before it is retried.
pub const RETRY_WINDOW_HOURS: i64 = 24;

/// File size growth beyond this fraction triggers re-extraction.
pub const REEXTRACT_GROWTH: f64 = 0.5;

/// State for one transcript path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
}

/// Why a candidate was passed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionDecision {
    /// Not yet extracted, grown past the threshold, or out of cooldown.
    Proceed,
    /// Extracted and the file has not grown enough to matter.
    SkipFresh,
    /// Failed recently; the retry window has not elapsed.
    SkipCooldown,
}

/// Pure scheduling decision over one record. `force` overrides everything.
pub fn decide(
    record: Option<&ExtractionRecord>,
    current_size: u64,
    now: DateTime<Utc>,
    force: bool,
) -> ExtractionDecision {
    if force {
        return ExtractionDecision::Proceed;
    }
    let Some(record) = record else {
        return ExtractionDecision::Proceed;
    };

    if record.extracted_at.is_some() {
        let grown = current_size.saturating_sub(record.size);
        if (grown as f64) <= record.size as f64 * REEXTRACT_GROWTH {
            return ExtractionDecision::SkipFresh;
        }
        return ExtractionDecision::Proceed;
    }

    if record.failed_at.is_some() {
        match record.retry_after {
            Some(retry_after) if retry_after > now => return ExtractionDecision::SkipCooldown,
            _ => return ExtractionDecision::Proceed,
        }
    }

    ExtractionDecision::Proceed
}

/// Owner of the on-disk state file. Load once, mutate, save.
#[derive(Debug)]
pub struct ExtractionTracker {
    path: PathBuf,
    records: HashMap<String, ExtractionRecord>,
}

impl ExtractionTracker {
    /// Load the tracker file. Absent or corrupt files start fresh; losing
    /// dedup state only costs re-extraction work.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "tracker file unreadable, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, records }
    }

    pub fn get(&self, transcript: &Path) -> Option<&ExtractionRecord> {
        self.records.get(&key(transcript))
    }

    /// Scheduling decision for a transcript at its current size.
    pub fn decide(
        &self,
        transcript: &Path,
        current_size: u64,
        now: DateTime<Utc>,
        force: bool,
    ) -> ExtractionDecision {
        decide(self.get(transcript), current_size, now, force)
    }

    /// Record a successful extraction.
    pub fn mark_extracted(&mut self, transcript: &Path, size: u64, now: DateTime<Utc>) {
        self.records.insert(
            key(transcript),
            ExtractionRecord {
                size,
                extracted_at: Some(now),
                failed_at: None,
                retry_after: None,
            },
        );
    }

    /// Record a failed extraction and open the retry window.
    pub fn mark_failed(&mut self, transcript: &Path, size: u64, now: DateTime<Utc>) {
        self.records.insert(
            key(transcript),
            ExtractionRecord {
                size,
                extracted_at: None,
                failed_at: Some(now),
                retry_after: Some(now + Duration::hours(RETRY_WINDOW_HOURS)),
            },
        );
    }

    /// Rewrite the whole state file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn extracted(size: u64) -> ExtractionRecord {
        ExtractionRecord {
            size,
            extracted_at: Some(now() - Duration::hours(1)),
            ..Default::default()
        }
    }

    fn failed(at: DateTime<Utc>) -> ExtractionRecord {
        ExtractionRecord {
            size: 100,
            failed_at: Some(at),
            retry_after: Some(at + Duration::hours(RETRY_WINDOW_HOURS)),
            ..Default::default()
        }
    }

    #[test]
    fn absent_record_proceeds() {
        assert_eq!(decide(None, 5_000, now(), false), ExtractionDecision::Proceed);
    }

    #[test]
    fn fresh_extraction_skips_until_half_growth() {
        let rec = extracted(1_000);
        assert_eq!(decide(Some(&rec), 1_000, now(), false), ExtractionDecision::SkipFresh);
        assert_eq!(decide(Some(&rec), 1_500, now(), false), ExtractionDecision::SkipFresh);
        assert_eq!(decide(Some(&rec), 1_501, now(), false), ExtractionDecision::Proceed);
    }

    #[test]
    fn cooldown_blocks_until_window_elapses() {
        let rec = failed(now() - Duration::hours(1));
        assert_eq!(decide(Some(&rec), 5_000, now(), false), ExtractionDecision::SkipCooldown);

        let rec = failed(now() - Duration::hours(RETRY_WINDOW_HOURS + 1));
        assert_eq!(decide(Some(&rec), 5_000, now(), false), ExtractionDecision::Proceed);
    }

    #[test]
    fn force_overrides_every_skip() {
        let rec = extracted(1_000);
        assert_eq!(decide(Some(&rec), 1_000, now(), true), ExtractionDecision::Proceed);
        let rec = failed(now());
        assert_eq!(decide(Some(&rec), 1_000, now(), true), ExtractionDecision::Proceed);
    }

    #[test]
    fn state_machine_over_random_walk() {
        // Walk the record through random size growth and clock advances and
        // check every transition stays within the documented machine.
        let mut tracker = ExtractionTracker {
            path: PathBuf::from("/nonexistent"),
            records: HashMap::new(),
        };
        let path = Path::new("/t/session.jsonl");
        let mut clock = now();
        let mut size = 2_000u64;

        // Pseudo-random but deterministic sequence
        let mut seed = 0x9E37u64;
        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let roll = seed % 100;

            let decision = tracker.decide(path, size, clock, false);
            match decision {
                ExtractionDecision::Proceed => {
                    if roll < 30 {
                        tracker.mark_failed(path, size, clock);
                        let rec = tracker.get(path).unwrap();
                        assert!(rec.failed_at.is_some());
                        assert_eq!(rec.retry_after.unwrap(), clock + Duration::hours(24));
                    } else {
                        tracker.mark_extracted(path, size, clock);
                        let rec = tracker.get(path).unwrap();
                        assert!(rec.extracted_at.is_some());
                        assert!(rec.failed_at.is_none());
                    }
                }
                ExtractionDecision::SkipFresh => {
                    let rec = tracker.get(path).unwrap();
                    assert!(rec.extracted_at.is_some());
                    assert!((size.saturating_sub(rec.size) as f64) <= rec.size as f64 * 0.5);
                }
                ExtractionDecision::SkipCooldown => {
                    let rec = tracker.get(path).unwrap();
                    assert!(rec.retry_after.unwrap() > clock);
                }
            }

            // advance world state
            if roll % 3 == 0 {
                size += (seed % 4_000) + 1;
            }
            clock += Duration::hours((seed % 30) as i64);
        }
    }

    #[test]
    fn tracker_round_trips_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join(".extraction_tracker.json");

        let mut tracker = ExtractionTracker::load(&state);
        tracker.mark_extracted(Path::new("/t/a.jsonl"), 4_321, now());
        tracker.mark_failed(Path::new("/t/b.jsonl"), 99, now());
        tracker.save().unwrap();

        let raw = std::fs::read_to_string(&state).unwrap();
        assert!(raw.contains("extractedAt"));
        assert!(raw.contains("retryAfter"));
        assert!(!raw.contains("extracted_at"));

        let reloaded = ExtractionTracker::load(&state);
        assert_eq!(reloaded.get(Path::new("/t/a.jsonl")).unwrap().size, 4_321);
        assert!(reloaded.get(Path::new("/t/b.jsonl")).unwrap().failed_at.is_some());
    }

    #[test]
    fn corrupt_tracker_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join(".extraction_tracker.json");
        std::fs::write(&state, "{ not json").unwrap();

        let tracker = ExtractionTracker::load(&state);
        assert!(tracker.get(Path::new("/t/a.jsonl")).is_none());
    }
}
