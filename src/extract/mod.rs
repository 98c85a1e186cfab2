//! Session extraction pipeline.
//!
//! Turns a raw transcript file into structured memory artifacts: normalize
//! the conversation ([`transcript`]), consult the dedup/retry state
//! ([`tracker`]), chunk oversize input, call the LLM extractor ([`llm`]),
//! quality-gate the output, and persist the results ([`outputs`]). Failures
//! never propagate as errors; they update the tracker's retry window and
//! report through [`ExtractOutcome`].

pub mod llm;
pub mod outputs;
pub mod scanner;
pub mod tracker;
pub mod transcript;

use chrono::Utc;
use std::path::Path;
use std::time::Duration;

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::project;
use outputs::{MemoryArtifacts, SessionIndexEntry};
use tracker::{ExtractionDecision, ExtractionTracker};

/// What the pipeline did with one transcript.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Summary produced and persisted.
    Extracted { chunks: usize, session_id: String },
    /// Dedup or cooldown said no.
    Skipped(&'static str),
    /// Extractor or quality gate failed; retry window opened.
    Failed(String),
}

/// Run the full pipeline for one transcript file.
///
/// `cwd` is the directory the session ran in, used for project detection;
/// `force` bypasses the dedup/cooldown checks.
pub async fn extract_file(
    config: &MemoryConfig,
    path: &Path,
    cwd: Option<&Path>,
    force: bool,
) -> Result<ExtractOutcome> {
    let artifacts = MemoryArtifacts::new(config.memory_dir(), config.extractor.hot_recall_sessions);
    let mut state = ExtractionTracker::load(artifacts.tracker_path());

    let size = std::fs::metadata(path)?.len();
    let now = Utc::now();

    match state.decide(path, size, now, force) {
        ExtractionDecision::Proceed => {}
        ExtractionDecision::SkipFresh => {
            tracing::debug!(path = %path.display(), "already extracted, not grown enough");
            return Ok(ExtractOutcome::Skipped("already extracted"));
        }
        ExtractionDecision::SkipCooldown => {
            tracing::debug!(path = %path.display(), "in failure cooldown");
            return Ok(ExtractOutcome::Skipped("retry window not reached"));
        }
    }

    let raw = std::fs::read_to_string(path)?;
    let parsed = transcript::parse_transcript(&raw);
    let normalized = transcript::normalize(&parsed);

    let session_id = parsed
        .session_id
        .clone()
        .unwrap_or_else(|| file_stem(path));

    if normalized.is_empty() {
        // Nothing extractable; treat as done so the scanner stops revisiting
        // until the file grows.
        tracing::info!(path = %path.display(), "no extractable turns");
        state.mark_extracted(path, size, now);
        state.save()?;
        return Ok(ExtractOutcome::Skipped("no extractable content"));
    }

    tracing::info!(
        path = %path.display(),
        session = %session_id,
        chars = normalized.len(),
        "extracting session"
    );

    let (extract, chunks) = match run_extraction(config, &normalized).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "extraction failed");
            state.mark_failed(path, size, now);
            state.save()?;
            return Ok(ExtractOutcome::Failed(e.to_string()));
        }
    };

    if !llm::passes_quality_gate(&extract) {
        tracing::warn!(path = %path.display(), "extractor output failed quality gate");
        state.mark_failed(path, size, now);
        state.save()?;
        return Ok(ExtractOutcome::Failed(
            Error::QualityGateFailed("missing required sections".into()).to_string(),
        ));
    }

    persist_extraction(config, &artifacts, path, cwd, &session_id, &extract)?;

    state.mark_extracted(path, size, Utc::now());
    state.save()?;

    Ok(ExtractOutcome::Extracted { chunks, session_id })
}

/// Single-pass or chunked extraction. Returns the final text and how many
/// chunk calls were made (1 for single-pass).
async fn run_extraction(config: &MemoryConfig, normalized: &str) -> Result<(String, usize)> {
    let extractor = &config.extractor;

    if normalized.len() <= extractor.chunk_threshold_chars {
        let text =
            llm::extract_with_fallback(extractor, llm::EXTRACTION_SYSTEM_PROMPT, normalized)
                .await?;
        return Ok((text, 1));
    }

    // Oversize: extract each chunk, then merge, all inside the total budget.
    let chunks = transcript::chunk_text(normalized, extractor.chunk_size_chars);
    let count = chunks.len();
    tracing::info!(chunks = count, "input exceeds single-pass ceiling, chunking");

    let total_budget = Duration::from_secs(extractor.total_timeout_secs);
    let chunked = tokio::time::timeout(total_budget, async {
        let mut partials = Vec::with_capacity(count);
        for (i, chunk) in chunks.iter().enumerate() {
            let partial =
                llm::extract_with_fallback(extractor, llm::EXTRACTION_SYSTEM_PROMPT, chunk).await?;
            tracing::debug!(chunk = i + 1, of = count, "chunk extracted");
            partials.push(partial);
        }
        Ok::<Vec<String>, Error>(partials)
    })
    .await
    .map_err(|_| {
        Error::ServiceUnavailable(format!(
            "chunked extraction exceeded {}s total budget",
            extractor.total_timeout_secs
        ))
    })??;

    let combined = chunked.join("\n\n");
    let merged =
        match llm::extract_with_fallback(extractor, llm::MERGE_SYSTEM_PROMPT, &combined).await {
            Ok(text) => text,
            Err(e) => {
                // Partials are still useful; fall back to the raw concatenation.
                tracing::warn!(error = %e, "meta-extraction failed, keeping concatenated partials");
                combined
            }
        };

    Ok((merged, count))
}

/// Write every artifact for a successful extraction. Each step is
/// independent but all are logged under the same session.
fn persist_extraction(
    config: &MemoryConfig,
    artifacts: &MemoryArtifacts,
    path: &Path,
    cwd: Option<&Path>,
    session_id: &str,
    extract: &str,
) -> Result<()> {
    let now = Utc::now();
    let date = now.format("%Y-%m-%d").to_string();

    let project = cwd
        .map(project::detect_project)
        .or_else(|| path.parent().and_then(project::from_encoded_dir_name));

    artifacts.append_distilled(&date, session_id, extract)?;

    artifacts.update_hot_recall(&format!("## {date} - {session_id}\n\n{extract}"))?;

    let summary = outputs::section_lead(extract, "ONE SENTENCE SUMMARY").unwrap_or_default();
    artifacts.upsert_session_index(SessionIndexEntry {
        session_id: session_id.to_string(),
        project: project.clone(),
        date: date.clone(),
        timestamp: now.to_rfc3339(),
        topics: outputs::derive_topics(extract),
        summary,
        file: path.to_string_lossy().into_owned(),
    })?;

    let decisions = outputs::section_bullets(extract, "DECISIONS MADE");
    artifacts.append_log(&artifacts.decisions_log_path(), &date, session_id, &decisions)?;

    let rejections = outputs::section_bullets(extract, "THINGS TO REJECT");
    artifacts.append_log(&artifacts.rejections_log_path(), &date, session_id, &rejections)?;

    let file_name = file_stem(path);
    let patterns = outputs::error_patterns_from(extract, &file_name, &date);
    artifacts.update_error_patterns(&patterns)?;

    tracing::info!(
        session = %session_id,
        project = project.as_deref().unwrap_or("-"),
        decisions = decisions.len(),
        rejections = rejections.len(),
        errors = patterns.len(),
        "extraction persisted"
    );
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorCommand;

    fn sh(script: &str) -> ExtractorCommand {
        ExtractorCommand {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    /// Script that emits a minimal but gate-passing extraction.
    fn good_extractor() -> ExtractorCommand {
        sh("cat >/dev/null; printf '## ONE SENTENCE SUMMARY\\nDid the thing.\\n\\n## MAIN IDEAS\\n- one idea\\n'")
    }

    fn test_config(dir: &Path, extractor: ExtractorCommand) -> MemoryConfig {
        let mut config = MemoryConfig::default();
        config.storage.base_dir = dir.to_string_lossy().into_owned();
        config.extractor.primary = extractor;
        config.extractor.fallback = None;
        config.extractor.timeout_secs = 20;
        config
    }

    fn write_transcript(dir: &Path, turns: usize) -> std::path::PathBuf {
        let path = dir.join("sess-42.jsonl");
        let mut body = String::new();
        for i in 0..turns {
            body.push_str(
                &serde_json::json!({
                    "sessionId": "sess-42",
                    "timestamp": "2026-03-01T10:00:00.000Z",
                    "message": {"role": if i % 2 == 0 { "user" } else { "assistant" },
                                "content": format!("turn number {i} with plenty of words in it")}
                })
                .to_string(),
            );
            body.push('\n');
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn successful_extraction_writes_artifacts_and_marks_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), good_extractor());
        let path = write_transcript(dir.path(), 6);

        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        match outcome {
            ExtractOutcome::Extracted { chunks, session_id } => {
                assert_eq!(chunks, 1);
                assert_eq!(session_id, "sess-42");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let artifacts = MemoryArtifacts::new(config.memory_dir(), 10);
        let distilled = std::fs::read_to_string(artifacts.distilled_path()).unwrap();
        assert!(distilled.contains("Did the thing."));
        assert!(artifacts.session_index_path().exists());
        assert!(artifacts.hot_recall_path().exists());

        // Second run skips: extracted and unchanged
        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        assert!(matches!(outcome, ExtractOutcome::Skipped("already extracted")));
    }

    #[tokio::test]
    async fn gate_failure_opens_retry_window_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), sh("cat >/dev/null; echo hello"));
        let path = write_transcript(dir.path(), 4);

        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        assert!(matches!(outcome, ExtractOutcome::Failed(_)));

        let artifacts = MemoryArtifacts::new(config.memory_dir(), 10);
        assert!(!artifacts.distilled_path().exists());

        let state = ExtractionTracker::load(artifacts.tracker_path());
        let record = state.get(&path).unwrap();
        assert!(record.failed_at.is_some());
        let window = record.retry_after.unwrap() - record.failed_at.unwrap();
        assert_eq!(window, chrono::Duration::hours(24));

        // Cooldown blocks an immediate retry
        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        assert!(matches!(outcome, ExtractOutcome::Skipped("retry window not reached")));

        // force bypasses the cooldown
        let outcome = extract_file(&config, &path, None, true).await.unwrap();
        assert!(matches!(outcome, ExtractOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn oversize_transcript_is_chunked_and_merged_once() {
        let dir = tempfile::tempdir().unwrap();
        // Count invocations via a side file so the test can assert chunk +
        // merge call counts.
        let counter = dir.path().join("calls");
        let script = format!(
            "cat >/dev/null; echo x >> {}; printf '## ONE SENTENCE SUMMARY\\nPart done.\\n\\n## MAIN IDEAS\\n- idea\\n'",
            counter.display()
        );
        let mut config = test_config(dir.path(), sh(&script));
        config.extractor.chunk_threshold_chars = 2_000;
        config.extractor.chunk_size_chars = 1_000;

        let path = write_transcript(dir.path(), 60); // ~60 * ~55 chars > 2000

        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        let ExtractOutcome::Extracted { chunks, .. } = outcome else {
            panic!("expected extraction");
        };
        assert!(chunks >= 2);

        let calls = std::fs::read_to_string(&counter).unwrap().lines().count();
        assert_eq!(calls, chunks + 1); // chunk calls plus one merge call

        let artifacts = MemoryArtifacts::new(config.memory_dir(), 10);
        let distilled = std::fs::read_to_string(artifacts.distilled_path()).unwrap();
        // Exactly one archive entry for the session
        assert_eq!(distilled.matches("- sess-42").count(), 1);
    }

    #[tokio::test]
    async fn extractor_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), sh("cat >/dev/null; exit 7"));
        let path = write_transcript(dir.path(), 4);

        let outcome = extract_file(&config, &path, None, false).await.unwrap();
        match outcome {
            ExtractOutcome::Failed(reason) => assert!(reason.contains("service unavailable")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
