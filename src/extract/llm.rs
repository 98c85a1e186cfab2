//! LLM extractor invocation.
//!
//! An extractor is an external command that reads the full prompt (system
//! prompt plus transcript) on stdin and writes the summary to stdout. The
//! primary command is tried first, then the configured fallback. Each
//! invocation gets a bounded timeout and is killed on expiry.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{ExtractorCommand, ExtractorConfig};
use crate::error::{Error, Result};

/// System prompt pinning the extraction output format.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a session distiller. Read the conversation transcript below and produce \
a structured extraction with EXACTLY these markdown sections, in this order:

## ONE SENTENCE SUMMARY
A single sentence capturing what this session accomplished.

## MAIN IDEAS
- Up to 10 bullet points of the core ideas discussed.

## INSIGHTS
- Bullet points of non-obvious realizations worth keeping.

## DECISIONS MADE
- Bullet points, one per concrete decision, with its rationale.

## THINGS TO REJECT / AVOID
- Bullet points for approaches that were considered and rejected, or mistakes to avoid.

## ERRORS FIXED
- Bullet points in the form `error: fix` for each error resolved in the session.

## ACTIONABLE ITEMS
- Bullet points of follow-up work the session left open.

## SESSION CONTEXT
One sentence on the project and working context.

Output only these sections. Do not add commentary before or after.";

/// Prompt used to merge per-chunk extractions of an oversize session.
pub const MERGE_SYSTEM_PROMPT: &str = "\
The text below contains several partial extractions of one long session, in \
order. Merge them into a single extraction with the same section structure \
(ONE SENTENCE SUMMARY, MAIN IDEAS, INSIGHTS, DECISIONS MADE, THINGS TO \
REJECT / AVOID, ERRORS FIXED, ACTIONABLE ITEMS, SESSION CONTEXT), combining \
duplicate bullets and keeping the most specific phrasing. Output only the \
merged sections.";

/// Prompt used for LoA capture over a span of raw messages.
pub const LOA_SYSTEM_PROMPT: &str = "\
Summarize the conversation below into a dense, self-contained extract that a \
future session can read to recover the full context: goals, what was done, \
key decisions with reasons, unresolved threads. Write plain prose and short \
bullets. Do not address the reader and do not mention that this is a summary.";

/// Headings that must appear in extractor output for it to be accepted.
pub const REQUIRED_HEADINGS: [&str; 2] = ["ONE SENTENCE SUMMARY", "MAIN IDEAS"];

/// Check the quality gate: both required headings present.
pub fn passes_quality_gate(output: &str) -> bool {
    REQUIRED_HEADINGS.iter().all(|h| output.contains(h))
}

/// Run one extractor command with a timeout. The prompt and input are
/// written to stdin; stdout is the result. Non-zero exit, timeout, or empty
/// output all surface as [`Error::ServiceUnavailable`].
pub async fn run_extractor(
    cmd: &ExtractorCommand,
    system_prompt: &str,
    input: &str,
    timeout: Duration,
) -> Result<String> {
    let mut child = Command::new(&cmd.command)
        .args(&cmd.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ServiceUnavailable(format!("failed to spawn {}: {e}", cmd.command)))?;

    let payload = format!("{system_prompt}\n\n{input}");
    if let Some(mut stdin) = child.stdin.take() {
        // The child may exit without draining stdin; a write error then is
        // expected, not fatal.
        let _ = stdin.write_all(payload.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result
            .map_err(|e| Error::ServiceUnavailable(format!("{} failed: {e}", cmd.command)))?,
        Err(_) => {
            return Err(Error::ServiceUnavailable(format!(
                "{} timed out after {}s",
                cmd.command,
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ServiceUnavailable(format!(
            "{} exited with {}: {}",
            cmd.command,
            output.status,
            stderr.chars().take(500).collect::<String>()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        return Err(Error::ServiceUnavailable(format!(
            "{} produced no output",
            cmd.command
        )));
    }
    Ok(text)
}

/// Try the primary extractor, then the fallback. Returns the first success.
pub async fn extract_with_fallback(
    config: &ExtractorConfig,
    system_prompt: &str,
    input: &str,
) -> Result<String> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match run_extractor(&config.primary, system_prompt, input, timeout).await {
        Ok(text) => Ok(text),
        Err(primary_err) => {
            let Some(fallback) = &config.fallback else {
                return Err(primary_err);
            };
            tracing::warn!(error = %primary_err, "primary extractor failed, trying fallback");
            run_extractor(fallback, system_prompt, input, timeout).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExtractorCommand {
        ExtractorCommand {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn quality_gate_needs_both_headings() {
        assert!(passes_quality_gate(
            "## ONE SENTENCE SUMMARY\nx\n## MAIN IDEAS\n- y"
        ));
        assert!(!passes_quality_gate("hello"));
        assert!(!passes_quality_gate("## ONE SENTENCE SUMMARY\nonly this"));
        assert!(!passes_quality_gate("## MAIN IDEAS\n- only this"));
    }

    #[tokio::test]
    async fn extractor_reads_stdin_and_returns_stdout() {
        let cmd = sh("grep -c TRANSCRIPT_MARKER");
        let out = run_extractor(&cmd, "system", "TRANSCRIPT_MARKER body", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out, "1");
    }

    #[tokio::test]
    async fn nonzero_exit_is_service_unavailable() {
        let cmd = sh("cat >/dev/null; echo boom >&2; exit 3");
        let err = run_extractor(&cmd, "s", "i", Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            Error::ServiceUnavailable(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let cmd = sh("cat >/dev/null; sleep 30");
        let err = run_extractor(&cmd, "s", "i", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_command_is_service_unavailable() {
        let cmd = ExtractorCommand {
            command: "definitely-not-a-real-binary-7d3f".into(),
            args: vec![],
        };
        let err = run_extractor(&cmd, "s", "i", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn fallback_covers_primary_failure() {
        let config = ExtractorConfig {
            primary: sh("cat >/dev/null; exit 1"),
            fallback: Some(sh("cat >/dev/null; echo fallback-output")),
            timeout_secs: 10,
            ..Default::default()
        };
        let out = extract_with_fallback(&config, "s", "i").await.unwrap();
        assert_eq!(out, "fallback-output");
    }

    #[tokio::test]
    async fn both_extractors_failing_propagates_error() {
        let config = ExtractorConfig {
            primary: sh("cat >/dev/null; exit 1"),
            fallback: Some(sh("cat >/dev/null; exit 2")),
            timeout_secs: 10,
            ..Default::default()
        };
        let err = extract_with_fallback(&config, "s", "i").await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }
}
