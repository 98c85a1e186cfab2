//! Batch scanner over the transcript tree.
//!
//! Walks the transcript root, selects candidate `.jsonl` files, and feeds
//! them through the extraction pipeline serially with a sleep between
//! calls. Medium-sized files (2 KB..500 KB) go first, then the oversize
//! tier, largest first within each tier; the big outliers tend to fail the
//! quality gate, so they spend the budget last.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use super::{extract_file, ExtractOutcome};
use crate::config::MemoryConfig;
use crate::error::Result;

/// One selectable transcript file.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub size: u64,
    /// Immediate parent directory name (the encoded project dir).
    pub project_dir: Option<String>,
    pub mtime: SystemTime,
}

/// Tally of one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub candidates: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Walk the tree and collect candidates in extraction order. Side-agent
/// transcripts (`agent-*.jsonl`) and files under the minimum size are
/// dropped here; per-file dedup happens inside the pipeline.
pub fn scan_candidates(root: &Path, min_size: u64, medium_max: u64) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with("agent-") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.len() < min_size {
            continue;
        }

        candidates.push(Candidate {
            path: path.to_path_buf(),
            size: meta.len(),
            project_dir: path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    // Medium tier first, then oversize; largest first within each
    candidates.sort_by(|a, b| {
        let tier = |c: &Candidate| usize::from(c.size > medium_max);
        tier(a).cmp(&tier(b)).then(b.size.cmp(&a.size))
    });
    candidates
}

/// Run the batch: scan, then extract serially. `limit` of `None` means
/// unlimited; `dry_run` lists candidates without touching the pipeline.
pub async fn run_batch(
    config: &MemoryConfig,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<BatchReport> {
    let root = config.resolved_transcript_root();
    let scanner = &config.scanner;
    let candidates = scan_candidates(&root, scanner.min_size_bytes, scanner.medium_max_bytes);

    let mut report = BatchReport {
        candidates: candidates.len(),
        ..Default::default()
    };

    if dry_run {
        for candidate in &candidates {
            println!(
                "{}  ({} bytes, {})",
                candidate.path.display(),
                candidate.size,
                candidate.project_dir.as_deref().unwrap_or("-"),
            );
        }
        return Ok(report);
    }

    // The batch clamps each extraction to its own tighter budget.
    let mut batch_config = config.clone();
    batch_config.extractor.timeout_secs = config
        .extractor
        .timeout_secs
        .min(scanner.batch_timeout_secs);
    batch_config.extractor.total_timeout_secs = config
        .extractor
        .total_timeout_secs
        .min(scanner.batch_timeout_secs);

    let budget = limit.unwrap_or(usize::MAX);
    let mut spent = 0usize;

    for candidate in candidates {
        if spent >= budget {
            break;
        }

        let outcome = extract_file(&batch_config, &candidate.path, None, false).await?;
        match outcome {
            ExtractOutcome::Extracted { .. } => {
                report.extracted += 1;
                spent += 1;
                tokio::time::sleep(Duration::from_secs(scanner.sleep_secs)).await;
            }
            ExtractOutcome::Skipped(_) => {
                report.skipped += 1;
            }
            ExtractOutcome::Failed(reason) => {
                tracing::warn!(path = %candidate.path.display(), reason = %reason, "batch extraction failed");
                report.failed += 1;
                spent += 1;
                tokio::time::sleep(Duration::from_secs(scanner.sleep_secs)).await;
            }
        }
    }

    tracing::info!(
        candidates = report.candidates,
        extracted = report.extracted,
        skipped = report.skipped,
        failed = report.failed,
        "batch scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, bytes: usize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x".repeat(bytes)).unwrap();
    }

    #[test]
    fn scan_filters_extension_size_and_side_agents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        touch(&root.join("p1/big.jsonl"), 10_000);
        touch(&root.join("p1/tiny.jsonl"), 1_999); // under the floor
        touch(&root.join("p1/agent-sub.jsonl"), 10_000); // side agent
        touch(&root.join("p1/notes.txt"), 10_000); // wrong extension

        let candidates = scan_candidates(root, 2_000, 500_000);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].path.ends_with("p1/big.jsonl"));
        assert_eq!(candidates[0].project_dir.as_deref(), Some("p1"));
    }

    #[test]
    fn boundary_file_at_exactly_2000_bytes_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("p/edge.jsonl"), 2_000);
        let candidates = scan_candidates(dir.path(), 2_000, 500_000);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn ordering_is_medium_tier_then_oversize_largest_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        touch(&root.join("p/huge.jsonl"), 600_000);
        touch(&root.join("p/mid-small.jsonl"), 3_000);
        touch(&root.join("p/mid-large.jsonl"), 400_000);

        let candidates = scan_candidates(root, 2_000, 500_000);
        let names: Vec<&str> = candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["mid-large.jsonl", "mid-small.jsonl", "huge.jsonl"]);
    }

    #[tokio::test]
    async fn dry_run_lists_without_extracting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MemoryConfig::default();
        config.storage.base_dir = dir.path().to_string_lossy().into_owned();
        config.scanner.transcript_root = dir.path().join("t").to_string_lossy().into_owned();

        touch(&dir.path().join("t/p/one.jsonl"), 5_000);

        let report = run_batch(&config, Some(10), true).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.extracted, 0);
        // Nothing was written
        assert!(!config.memory_dir().exists());
    }
}
