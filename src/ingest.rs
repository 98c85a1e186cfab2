//! Direct transcript ingestion: parse a transcript file into a session and
//! its messages, and bulk-import a whole transcript tree.
//!
//! Shares the flattening and filtering rules with the extraction pipeline,
//! so the messages stored here match what the extractor summarizes.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use std::path::Path;

use crate::error::Result;
use crate::extract::scanner::scan_candidates;
use crate::extract::transcript::{self, ParsedTranscript};
use crate::model::{NewMessage, NewSession};
use crate::project;
use crate::repo::sessions;

/// A transcript parsed into repository-ready records.
#[derive(Debug)]
pub struct ParsedSession {
    pub session: NewSession,
    pub messages: Vec<NewMessage>,
}

/// Tally of one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub examined: usize,
    pub imported: usize,
    pub skipped: usize,
    pub messages: usize,
}

/// Parse one transcript file end-to-end. The session id comes from the
/// stream, falling back to the filename stem; the project label from the
/// session's cwd, falling back to the encoded parent-directory name.
pub fn parse_session_file(path: &Path) -> Result<ParsedSession> {
    let raw = std::fs::read_to_string(path)?;
    let parsed = transcript::parse_transcript(&raw);
    Ok(build_session(path, parsed))
}

fn build_session(path: &Path, parsed: ParsedTranscript) -> ParsedSession {
    let external_id = parsed.session_id.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    });

    let project = parsed
        .cwd
        .as_deref()
        .map(|cwd| project::detect_project(Path::new(cwd)))
        .or_else(|| path.parent().and_then(project::from_encoded_dir_name));

    let started_at = parsed.turns.iter().find_map(|t| t.ts);
    let ended_at = parsed.turns.iter().rev().find_map(|t| t.ts);
    let fallback_ts = started_at.unwrap_or_else(Utc::now);

    let messages = parsed
        .turns
        .iter()
        .map(|turn| NewMessage {
            session_ref: external_id.clone(),
            ts: turn.ts.unwrap_or(fallback_ts),
            role: turn.role,
            content: turn.text.clone(),
            project: project.clone(),
        })
        .collect();

    ParsedSession {
        session: NewSession {
            external_id,
            started_at,
            ended_at,
            project,
            cwd: parsed.cwd,
            branch: parsed.branch,
            model: parsed.model,
            ..Default::default()
        },
        messages,
    }
}

/// Ingest one parsed session: create the session row, then its messages, in
/// order. The caller decides whether an existing session should be replaced
/// first (see [`sessions::delete_session_cascade`]).
pub fn ingest_session(conn: &mut Connection, parsed: &ParsedSession) -> Result<usize> {
    sessions::create_session(conn, &parsed.session)?;
    sessions::add_messages_batch(conn, &parsed.messages)
}

/// Walk the transcript root and import every session not yet in the store.
pub fn import_sessions(
    conn: &mut Connection,
    root: &Path,
    dry_run: bool,
    verbose: bool,
) -> Result<ImportReport> {
    let candidates = scan_candidates(root, 1, u64::MAX);
    let mut report = ImportReport::default();

    let bar = if verbose || dry_run {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(candidates.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} sessions")
                .expect("valid template"),
        );
        bar
    };

    for candidate in &candidates {
        report.examined += 1;
        bar.inc(1);

        let parsed = match parse_session_file(&candidate.path) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %candidate.path.display(), error = %e, "unreadable transcript");
                report.skipped += 1;
                continue;
            }
        };

        if parsed.messages.is_empty() {
            report.skipped += 1;
            continue;
        }

        if sessions::session_exists(conn, &parsed.session.external_id)? {
            if verbose {
                println!("  skip {} (already imported)", parsed.session.external_id);
            }
            report.skipped += 1;
            continue;
        }

        if dry_run {
            println!(
                "  would import {} ({} messages, project {})",
                parsed.session.external_id,
                parsed.messages.len(),
                parsed.session.project.as_deref().unwrap_or("-"),
            );
            report.imported += 1;
            report.messages += parsed.messages.len();
            continue;
        }

        let inserted = ingest_session(conn, &parsed)?;
        if verbose {
            println!(
                "  imported {} ({inserted} messages)",
                parsed.session.external_id
            );
        }
        report.imported += 1;
        report.messages += inserted;
    }

    bar.finish_and_clear();
    Ok(report)
}
