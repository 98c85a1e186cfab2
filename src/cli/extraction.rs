use std::path::Path;

use recollect::config::MemoryConfig;
use recollect::error::Result;
use recollect::extract::{self, scanner, ExtractOutcome};

/// Extract one transcript file.
pub async fn file(config: &MemoryConfig, path: &Path, cwd: Option<&Path>, force: bool) -> Result<()> {
    match extract::extract_file(config, path, cwd, force).await? {
        ExtractOutcome::Extracted { chunks, session_id } => {
            if chunks > 1 {
                println!("Extracted session {session_id} ({chunks} chunks, merged).");
            } else {
                println!("Extracted session {session_id}.");
            }
        }
        ExtractOutcome::Skipped(reason) => println!("Skipped: {reason}."),
        ExtractOutcome::Failed(reason) => println!("Extraction failed: {reason}"),
    }
    Ok(())
}

/// Scan the transcript tree and extract candidates in order.
pub async fn scan(config: &MemoryConfig, limit: Option<usize>, dry_run: bool) -> Result<()> {
    let report = scanner::run_batch(config, limit, dry_run).await?;
    if dry_run {
        println!("\n{} candidate(s).", report.candidates);
    } else {
        println!(
            "Scan complete: {} extracted, {} skipped, {} failed ({} candidates).",
            report.extracted, report.skipped, report.failed, report.candidates
        );
    }
    Ok(())
}
