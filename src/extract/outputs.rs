//! The rolling artifact files under `$BASE/MEMORY/`.
//!
//! Every successful extraction lands in five places: the append-only
//! DISTILLED.md archive, the capped HOT_RECALL.md rotation, the
//! SESSION_INDEX.json catalog, the decisions/rejections logs (pipe-delimited,
//! deduplicated), and the ERROR_PATTERNS.json upsert file. All writers are
//! whole-file rewrites except the two append-only files.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Session-index entries kept, newest first.
pub const SESSION_INDEX_CAP: usize = 500;

/// Topics recorded per session-index entry.
const TOPIC_CAP: usize = 5;

/// One row of SESSION_INDEX.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub session_id: String,
    pub project: Option<String>,
    pub date: String,
    pub timestamp: String,
    pub topics: Vec<String>,
    pub summary: String,
    pub file: String,
}

/// One entry of ERROR_PATTERNS.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub error: String,
    pub cause: String,
    pub fix: String,
    pub file: String,
    pub date: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ErrorPatternFile {
    #[serde(default)]
    patterns: Vec<ErrorPattern>,
    #[serde(default)]
    meta: ErrorPatternMeta,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorPatternMeta {
    purpose: String,
    updated: String,
}

impl Default for ErrorPatternMeta {
    fn default() -> Self {
        Self {
            purpose: "Recurring error signatures and their fixes, for fast diagnosis".into(),
            updated: String::new(),
        }
    }
}

/// Writer for the MEMORY/ artifact tree.
#[derive(Debug)]
pub struct MemoryArtifacts {
    dir: PathBuf,
    hot_recall_cap: usize,
}

impl MemoryArtifacts {
    pub fn new(dir: impl Into<PathBuf>, hot_recall_cap: usize) -> Self {
        Self {
            dir: dir.into(),
            hot_recall_cap,
        }
    }

    pub fn distilled_path(&self) -> PathBuf {
        self.dir.join("DISTILLED.md")
    }

    pub fn hot_recall_path(&self) -> PathBuf {
        self.dir.join("HOT_RECALL.md")
    }

    pub fn session_index_path(&self) -> PathBuf {
        self.dir.join("SESSION_INDEX.json")
    }

    pub fn decisions_log_path(&self) -> PathBuf {
        self.dir.join("DECISIONS_LOG.txt")
    }

    pub fn rejections_log_path(&self) -> PathBuf {
        self.dir.join("REJECTIONS_LOG.txt")
    }

    pub fn error_patterns_path(&self) -> PathBuf {
        self.dir.join("ERROR_PATTERNS.json")
    }

    pub fn tracker_path(&self) -> PathBuf {
        self.dir.join(".extraction_tracker.json")
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Append one extraction to the rolling archive under a dated heading.
    pub fn append_distilled(&self, date: &str, label: &str, extract: &str) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.distilled_path();
        let mut body = std::fs::read_to_string(&path).unwrap_or_default();
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(&format!("\n## {date} - {label}\n\n{extract}\n"));
        std::fs::write(&path, body)?;
        Ok(path)
    }

    /// Prepend one section to the hot-recall rotation, keeping only the
    /// newest N sessions, separated by `---` lines.
    pub fn update_hot_recall(&self, section: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.hot_recall_path();
        let existing = std::fs::read_to_string(&path).unwrap_or_default();

        let mut sections: Vec<String> = vec![section.trim().to_string()];
        sections.extend(
            existing
                .split("\n---\n")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        sections.truncate(self.hot_recall_cap);

        std::fs::write(&path, sections.join("\n---\n") + "\n")?;
        Ok(())
    }

    /// Insert or replace the index entry for a session; newest first,
    /// capped at [`SESSION_INDEX_CAP`].
    pub fn upsert_session_index(&self, entry: SessionIndexEntry) -> Result<()> {
        self.ensure_dir()?;
        let path = self.session_index_path();
        let mut entries: Vec<SessionIndexEntry> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        entries.retain(|e| e.session_id != entry.session_id);
        entries.push(entry);
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(SESSION_INDEX_CAP);

        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// Append `YYYY-MM-DD|label|text` lines, skipping entries whose
    /// normalized text already appears in the log. Returns lines added.
    pub fn append_log(
        &self,
        log_path: &Path,
        date: &str,
        label: &str,
        texts: &[String],
    ) -> Result<usize> {
        self.ensure_dir()?;
        let existing = std::fs::read_to_string(log_path).unwrap_or_default();
        let mut seen: HashSet<String> = existing
            .lines()
            .filter_map(|line| line.splitn(3, '|').nth(2))
            .map(normalize_entry)
            .collect();

        let mut body = existing;
        let mut added = 0usize;
        for text in texts {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if seen.insert(normalize_entry(text)) {
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body.push_str(&format!("{date}|{label}|{text}\n"));
                added += 1;
            }
        }

        if added > 0 {
            std::fs::write(log_path, body)?;
        }
        Ok(added)
    }

    /// Upsert error patterns keyed by normalized error text and refresh the
    /// meta block.
    pub fn update_error_patterns(&self, new_patterns: &[ErrorPattern]) -> Result<()> {
        if new_patterns.is_empty() {
            return Ok(());
        }
        self.ensure_dir()?;
        let path = self.error_patterns_path();
        let mut file: ErrorPatternFile = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        for pattern in new_patterns {
            let key = normalize_entry(&pattern.error);
            if key.is_empty() {
                continue;
            }
            match file
                .patterns
                .iter_mut()
                .find(|p| normalize_entry(&p.error) == key)
            {
                Some(existing) => *existing = pattern.clone(),
                None => file.patterns.push(pattern.clone()),
            }
        }
        file.meta.updated = Utc::now().to_rfc3339();

        std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

/// Dedup key: lowercased, quotes and whitespace stripped.
pub fn normalize_entry(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'' && *c != '`')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Bullet lines under the first heading containing `heading`, stopping at
/// the next heading.
pub fn section_bullets(text: &str, heading: &str) -> Vec<String> {
    let mut bullets = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if is_heading(trimmed) {
            if in_section {
                break;
            }
            in_section = heading_text(trimmed).contains(heading);
            continue;
        }
        if in_section {
            if let Some(bullet) = strip_bullet(trimmed) {
                if !bullet.is_empty() {
                    bullets.push(bullet.to_string());
                }
            }
        }
    }
    bullets
}

/// First non-empty, non-bullet-marker line under a heading; used for the
/// one-sentence summary.
pub fn section_lead(text: &str, heading: &str) -> Option<String> {
    let mut in_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if is_heading(trimmed) {
            if in_section {
                break;
            }
            in_section = heading_text(trimmed).contains(heading);
            continue;
        }
        if in_section && !trimmed.is_empty() {
            return Some(strip_bullet(trimmed).unwrap_or(trimmed).to_string());
        }
    }
    None
}

/// Topics for the session index: the first three bullets under each of
/// DECISIONS MADE, MAIN IDEAS, and INSIGHTS, up to five total.
pub fn derive_topics(extract: &str) -> Vec<String> {
    let mut topics = Vec::new();
    for heading in ["DECISIONS MADE", "MAIN IDEAS", "INSIGHTS"] {
        for bullet in section_bullets(extract, heading).into_iter().take(3) {
            let topic: String = bullet.chars().take(80).collect();
            topics.push(topic);
            if topics.len() == TOPIC_CAP {
                return topics;
            }
        }
    }
    topics
}

/// Turn ERRORS FIXED bullets into error patterns. `error: fix` bullets split
/// on the first colon; anything else becomes an error with an empty fix.
pub fn error_patterns_from(extract: &str, file: &str, date: &str) -> Vec<ErrorPattern> {
    section_bullets(extract, "ERRORS FIXED")
        .into_iter()
        .map(|bullet| {
            let (error, fix) = match bullet.split_once(':') {
                Some((e, f)) => (e.trim().to_string(), f.trim().to_string()),
                None => (bullet.trim().to_string(), String::new()),
            };
            ErrorPattern {
                error,
                cause: String::new(),
                fix,
                file: file.to_string(),
                date: date.to_string(),
            }
        })
        .filter(|p| !p.error.is_empty())
        .collect()
}

fn is_heading(line: &str) -> bool {
    if line.starts_with('#') {
        return true;
    }
    // ALL-CAPS lines like "MAIN IDEAS" act as headings too
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty()
        && letters.iter().all(|c| c.is_uppercase())
        && strip_bullet(line).is_none()
        && line.len() >= 4
}

fn heading_text(line: &str) -> &str {
    line.trim_start_matches('#').trim()
}

fn strip_bullet(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
## ONE SENTENCE SUMMARY
Shipped the retry logic for the sync worker.

## MAIN IDEAS
- Retry with jitter beats fixed backoff here
- The sync worker should own its queue

## INSIGHTS
- Most failures were DNS, not the remote service

## DECISIONS MADE
- Use exponential backoff with 3 attempts
- Keep the queue in sqlite

## THINGS TO REJECT / AVOID
- Do not retry on 4xx responses

## ERRORS FIXED
- connection reset during flush: reopen the socket before retrying
- stale lease not released

## ACTIONABLE ITEMS
- Wire up metrics for retry counts

## SESSION CONTEXT
Working in the sync-worker repo on the retry epic.";

    fn artifacts(dir: &Path) -> MemoryArtifacts {
        MemoryArtifacts::new(dir, 3)
    }

    #[test]
    fn bullets_stop_at_next_heading() {
        let ideas = section_bullets(SAMPLE, "MAIN IDEAS");
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0], "Retry with jitter beats fixed backoff here");

        let rejects = section_bullets(SAMPLE, "THINGS TO REJECT");
        assert_eq!(rejects, vec!["Do not retry on 4xx responses"]);
    }

    #[test]
    fn lead_line_is_the_summary_sentence() {
        assert_eq!(
            section_lead(SAMPLE, "ONE SENTENCE SUMMARY").unwrap(),
            "Shipped the retry logic for the sync worker."
        );
    }

    #[test]
    fn topics_pull_from_three_sections_capped_at_five() {
        let topics = derive_topics(SAMPLE);
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0], "Use exponential backoff with 3 attempts");
        assert_eq!(topics[2], "Retry with jitter beats fixed backoff here");
    }

    #[test]
    fn error_patterns_split_on_colon() {
        let patterns = error_patterns_from(SAMPLE, "s.jsonl", "2026-03-01");
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].error, "connection reset during flush");
        assert_eq!(patterns[0].fix, "reopen the socket before retrying");
        assert_eq!(patterns[1].error, "stale lease not released");
        assert_eq!(patterns[1].fix, "");
    }

    #[test]
    fn normalize_strips_case_quotes_whitespace() {
        assert_eq!(
            normalize_entry("Use \"Redis\" for caching"),
            normalize_entry("use redis   forcaching ")
        );
    }

    #[test]
    fn distilled_appends_dated_sections() {
        let dir = tempfile::tempdir().unwrap();
        let art = artifacts(dir.path());

        art.append_distilled("2026-03-01", "sess-1", "first extract").unwrap();
        art.append_distilled("2026-03-02", "sess-2", "second extract").unwrap();

        let body = std::fs::read_to_string(art.distilled_path()).unwrap();
        assert!(body.contains("## 2026-03-01 - sess-1"));
        assert!(body.contains("## 2026-03-02 - sess-2"));
        let first = body.find("first extract").unwrap();
        let second = body.find("second extract").unwrap();
        assert!(first < second);
    }

    #[test]
    fn hot_recall_rotates_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let art = artifacts(dir.path());

        for i in 1..=5 {
            art.update_hot_recall(&format!("session number {i}")).unwrap();
        }

        let body = std::fs::read_to_string(art.hot_recall_path()).unwrap();
        let sections: Vec<&str> = body.split("\n---\n").map(str::trim).collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "session number 5");
        assert_eq!(sections[2], "session number 3");
    }

    #[test]
    fn session_index_upserts_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let art = artifacts(dir.path());

        let entry = |id: &str, ts: &str| SessionIndexEntry {
            session_id: id.into(),
            project: Some("demo".into()),
            date: ts[..10].into(),
            timestamp: ts.into(),
            topics: vec!["topic".into()],
            summary: "did things".into(),
            file: format!("{id}.jsonl"),
        };

        art.upsert_session_index(entry("a", "2026-03-01T10:00:00Z")).unwrap();
        art.upsert_session_index(entry("b", "2026-03-02T10:00:00Z")).unwrap();
        // Re-extracting session a moves it to the top
        art.upsert_session_index(entry("a", "2026-03-03T10:00:00Z")).unwrap();

        let raw = std::fs::read_to_string(art.session_index_path()).unwrap();
        assert!(raw.contains("sessionId"));
        let entries: Vec<SessionIndexEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].session_id, "a");
        assert_eq!(entries[1].session_id, "b");
    }

    #[test]
    fn logs_dedup_by_normalized_text() {
        let dir = tempfile::tempdir().unwrap();
        let art = artifacts(dir.path());
        let log = art.decisions_log_path();

        let added = art
            .append_log(
                &log,
                "2026-03-01",
                "sess-1",
                &["Use Redis for caching".into(), "Ship on Friday".into()],
            )
            .unwrap();
        assert_eq!(added, 2);

        // Same decision, different quoting and case, from another session
        let added = art
            .append_log(&log, "2026-03-02", "sess-2", &["use \"redis\" for caching".into()])
            .unwrap();
        assert_eq!(added, 0);

        let body = std::fs::read_to_string(&log).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.lines().all(|l| l.splitn(3, '|').count() == 3));
    }

    #[test]
    fn error_patterns_upsert_by_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let art = artifacts(dir.path());

        let pattern = |fix: &str| ErrorPattern {
            error: "connection reset".into(),
            cause: String::new(),
            fix: fix.into(),
            file: "s.jsonl".into(),
            date: "2026-03-01".into(),
        };

        art.update_error_patterns(&[pattern("first fix")]).unwrap();
        art.update_error_patterns(&[pattern("better fix")]).unwrap();

        let raw = std::fs::read_to_string(art.error_patterns_path()).unwrap();
        let file: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let patterns = file["patterns"].as_array().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0]["fix"], "better fix");
        assert!(!file["meta"]["updated"].as_str().unwrap().is_empty());
    }
}
