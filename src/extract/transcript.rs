//! Transcript parsing and normalization.
//!
//! A transcript is a newline-delimited JSON stream. Each line may carry a
//! user or assistant message whose `content` is a plain string, a list of
//! content blocks, or an object with a `.text` field. Tool-use, tool-result,
//! and thinking blocks are ignored, as are non-message lines.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::Role;

/// Per-message truncation ceiling applied during normalization.
pub const MESSAGE_CHAR_CAP: usize = 4_000;

/// Messages shorter than this after flattening are dropped.
pub const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    #[serde(rename = "gitBranch")]
    git_branch: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    role: Option<String>,
    model: Option<String>,
    content: Option<Content>,
}

/// The three shapes `content` arrives in on the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Object(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

/// One usable conversation turn extracted from the stream.
#[derive(Debug, Clone)]
pub struct ParsedTurn {
    pub role: Role,
    pub text: String,
    pub ts: Option<DateTime<Utc>>,
}

/// Everything the stream yields: session metadata from whichever lines carry
/// it, plus the filtered turns.
#[derive(Debug, Default)]
pub struct ParsedTranscript {
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model: Option<String>,
    pub turns: Vec<ParsedTurn>,
}

/// Parse a full transcript. Lines that are not valid JSON, carry no message,
/// or have an unrecognized role are skipped. Turn text is flattened,
/// filtered (minimum length, tool-result payloads), and capped.
pub fn parse_transcript(raw: &str) -> ParsedTranscript {
    let mut parsed = ParsedTranscript::default();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<RawLine>(line) else {
            continue;
        };

        if parsed.session_id.is_none() {
            parsed.session_id = record.session_id.clone();
        }
        if parsed.cwd.is_none() {
            parsed.cwd = record.cwd.clone();
        }
        if parsed.branch.is_none() {
            parsed.branch = record.git_branch.clone();
        }

        let Some(message) = record.message else {
            continue;
        };
        if parsed.model.is_none() {
            parsed.model = message.model.clone();
        }

        let role = match message.role.as_deref() {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };

        let Some(content) = message.content else {
            continue;
        };
        let Some(text) = clean_turn(&flatten_content(&content)) else {
            continue;
        };

        let ts = record
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        parsed.turns.push(ParsedTurn { role, text, ts });
    }

    parsed
}

/// Collapse any content shape into plain text. Only `text` blocks
/// contribute; tool_use, tool_result, and thinking blocks drop out here.
fn flatten_content(content: &Content) -> String {
    match content {
        Content::Text(s) => s.clone(),
        Content::Blocks(blocks) => blocks
            .iter()
            .filter(|b| b.block_type.as_deref() == Some("text"))
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n"),
        Content::Object(value) => value
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Apply the turn filters: drop short messages and tool-result payloads,
/// cap the rest at [`MESSAGE_CHAR_CAP`] chars with an ellipsis marker.
fn clean_turn(text: &str) -> Option<String> {
    let text = text.trim();
    if text.chars().count() < MIN_MESSAGE_CHARS {
        return None;
    }
    if text.starts_with("[{") || text.starts_with("{\"tool_use_id\"") {
        return None;
    }

    let mut indices = text.char_indices();
    match indices.nth(MESSAGE_CHAR_CAP) {
        Some((idx, _)) => Some(format!("{}...", &text[..idx])),
        None => Some(text.to_string()),
    }
}

/// Flatten parsed turns into the single text document handed to the
/// extractor: `[ROLE]: text` turns separated by blank lines.
pub fn normalize(parsed: &ParsedTranscript) -> String {
    parsed
        .turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => "SYSTEM",
            };
            format!("[{role}]: {}", turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split normalized text on line boundaries into chunks of at most
/// `max_chars` chars. A single oversized line is hard-split on a char
/// boundary.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buf = String::new();

    for line in text.lines() {
        let needed = if buf.is_empty() { line.len() } else { buf.len() + 1 + line.len() };
        if needed > max_chars && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
        }

        if line.len() > max_chars {
            if !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
            }
            let mut rest = line;
            while !rest.is_empty() {
                let split = rest
                    .char_indices()
                    .take_while(|(i, _)| *i < max_chars)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(rest.len());
                chunks.push(rest[..split].to_string());
                rest = &rest[split..];
            }
        } else {
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(line);
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}
