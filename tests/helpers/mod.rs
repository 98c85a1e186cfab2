#![allow(dead_code)]

use std::path::{Path, PathBuf};

use recollect::config::{ExtractorCommand, MemoryConfig};
use recollect::engine::Engine;
use recollect::model::{NewMessage, NewSession, Role};
use recollect::repo::sessions;

/// Config rooted in a temp dir, with an unreachable embedding endpoint (so
/// tests are hermetic) and a gate-passing fake extractor.
pub fn test_config(base: &Path) -> MemoryConfig {
    let mut config = MemoryConfig::default();
    config.storage.base_dir = base.to_string_lossy().into_owned();
    config.scanner.transcript_root = base.join("transcripts").to_string_lossy().into_owned();
    // Reserved TEST-NET address; nothing listens here
    config.embedding.url = "http://192.0.2.1:1".into();
    config.embedding.timeout_secs = 1;
    config.extractor.primary = fake_extractor(
        "## ONE SENTENCE SUMMARY\\nDid the thing.\\n\\n## MAIN IDEAS\\n- the idea\\n",
    );
    config.extractor.fallback = None;
    config.extractor.timeout_secs = 20;
    config.scanner.sleep_secs = 0;
    config
}

/// An extractor faked with `sh`: drains stdin, then prints `output`
/// (printf-escaped, so `\n` becomes a newline).
pub fn fake_extractor(output: &str) -> ExtractorCommand {
    ExtractorCommand {
        command: "sh".into(),
        args: vec!["-c".into(), format!("cat >/dev/null; printf '{output}'")],
    }
}

/// Initialize a fresh engine in a temp base dir.
pub fn test_engine(base: &Path) -> Engine {
    let (engine, created) = Engine::init(test_config(base)).unwrap();
    assert!(created);
    engine
}

/// Seed a session with `count` messages at one-second intervals, returning
/// the inserted count.
pub fn seed_session(
    conn: &mut rusqlite::Connection,
    external_id: &str,
    project: Option<&str>,
    count: usize,
) -> usize {
    sessions::create_session(
        conn,
        &NewSession {
            external_id: external_id.into(),
            project: project.map(str::to_string),
            ..Default::default()
        },
    )
    .unwrap();

    let messages: Vec<NewMessage> = (0..count)
        .map(|i| NewMessage {
            session_ref: external_id.into(),
            ts: chrono::DateTime::parse_from_rfc3339(&format!(
                "2026-03-01T10:00:{:02}Z",
                i % 60
            ))
            .unwrap()
            .with_timezone(&chrono::Utc),
            role: if i % 2 == 0 { Role::User } else { Role::Assistant },
            content: format!("seeded message number {i} with enough words to keep"),
            project: project.map(str::to_string),
        })
        .collect();
    sessions::add_messages_batch(conn, &messages).unwrap()
}

/// Write a JSONL transcript file with `turns` alternating user/assistant
/// turns. Returns its path.
pub fn write_transcript(dir: &Path, name: &str, session_id: &str, turns: usize) -> PathBuf {
    write_transcript_with_content(dir, name, session_id, turns, |i| {
        format!("transcript turn number {i} with plenty of real words in it")
    })
}

/// Same, with caller-controlled per-turn content.
pub fn write_transcript_with_content(
    dir: &Path,
    name: &str,
    session_id: &str,
    turns: usize,
    content: impl Fn(usize) -> String,
) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut body = String::new();
    for i in 0..turns {
        body.push_str(
            &serde_json::json!({
                "sessionId": session_id,
                "timestamp": format!("2026-03-01T10:{:02}:{:02}.000Z", i / 60, i % 60),
                "cwd": "/definitely/not/real/widgets",
                "gitBranch": "main",
                "message": {
                    "role": if i % 2 == 0 { "user" } else { "assistant" },
                    "content": content(i)
                }
            })
            .to_string(),
        );
        body.push('\n');
    }
    std::fs::write(&path, body).unwrap();
    path
}
