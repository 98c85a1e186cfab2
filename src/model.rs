//! Core entity definitions.
//!
//! Every row kind stored by the engine lives here: [`Session`], [`Message`],
//! the structured records ([`Decision`], [`Learning`], [`Breadcrumb`]),
//! curated extracts ([`LoaEntry`]), the optional [`TelosEntry`] and
//! [`Document`] kinds, and the closed enums that gate their string-coded
//! columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Lifecycle of a recorded decision. Transitions are append-only revisions;
/// prior states are never destructively edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Superseded,
    Reverted,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::Reverted => "reverted",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            "reverted" => Ok(Self::Reverted),
            _ => Err(format!("unknown decision status: {s}")),
        }
    }
}

/// Category of a TELOS purpose-framework entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelosType {
    Identity,
    Problem,
    Mission,
    Goal,
    Challenge,
    Strategy,
    Project,
    Skill,
    Aspiration,
    Metric,
    Other,
}

impl TelosType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Problem => "problem",
            Self::Mission => "mission",
            Self::Goal => "goal",
            Self::Challenge => "challenge",
            Self::Strategy => "strategy",
            Self::Project => "project",
            Self::Skill => "skill",
            Self::Aspiration => "aspiration",
            Self::Metric => "metric",
            Self::Other => "other",
        }
    }

    /// Infer the type from a TELOS code prefix (`G1` → goal, `M2` → mission).
    pub fn from_code(code: &str) -> Self {
        let prefix: String = code
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match prefix.as_str() {
            "I" | "ID" => Self::Identity,
            "P" | "PR" => Self::Problem,
            "M" => Self::Mission,
            "G" => Self::Goal,
            "C" | "CH" => Self::Challenge,
            "S" | "ST" => Self::Strategy,
            "PROJ" => Self::Project,
            "SK" => Self::Skill,
            "A" | "ASP" => Self::Aspiration,
            "K" | "KPI" => Self::Metric,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for TelosType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TelosType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "problem" => Ok(Self::Problem),
            "mission" => Ok(Self::Mission),
            "goal" => Ok(Self::Goal),
            "challenge" => Ok(Self::Challenge),
            "strategy" => Ok(Self::Strategy),
            "project" => Ok(Self::Project),
            "skill" => Ok(Self::Skill),
            "aspiration" => Ok(Self::Aspiration),
            "metric" => Ok(Self::Metric),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown telos type: {s}")),
        }
    }
}

/// Category of an imported document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Diary,
    Reference,
    Wisdom,
    Plan,
    Memory,
    Enterprise,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diary => "diary",
            Self::Reference => "reference",
            Self::Wisdom => "wisdom",
            Self::Plan => "plan",
            Self::Memory => "memory",
            Self::Enterprise => "enterprise",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diary" => Ok(Self::Diary),
            "reference" => Ok(Self::Reference),
            "wisdom" => Ok(Self::Wisdom),
            "plan" => Ok(Self::Plan),
            "memory" => Ok(Self::Memory),
            "enterprise" => Ok(Self::Enterprise),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown document type: {s}")),
        }
    }
}

/// The searchable entity kinds. Each has a base table and an FTS5 shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Messages,
    Decisions,
    Learnings,
    Breadcrumbs,
    Loa,
    Telos,
    Documents,
}

impl SearchKind {
    /// All kinds, in search-merge order.
    pub const ALL: [SearchKind; 7] = [
        Self::Messages,
        Self::Decisions,
        Self::Learnings,
        Self::Breadcrumbs,
        Self::Loa,
        Self::Telos,
        Self::Documents,
    ];

    /// Base table name. Doubles as the `source_kind` tag on embeddings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Decisions => "decisions",
            Self::Learnings => "learnings",
            Self::Breadcrumbs => "breadcrumbs",
            Self::Loa => "loa_entries",
            Self::Telos => "telos_entries",
            Self::Documents => "documents",
        }
    }
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messages" | "message" => Ok(Self::Messages),
            "decisions" | "decision" => Ok(Self::Decisions),
            "learnings" | "learning" => Ok(Self::Learnings),
            "breadcrumbs" | "breadcrumb" => Ok(Self::Breadcrumbs),
            "loa_entries" | "loa" => Ok(Self::Loa),
            "telos_entries" | "telos" => Ok(Self::Telos),
            "documents" | "document" | "docs" => Ok(Self::Documents),
            _ => Err(format!("unknown search kind: {s}")),
        }
    }
}

/// One recorded conversation. Created on first ingestion of a transcript;
/// only `ended_at` and `summary` mutate afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub external_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model: Option<String>,
}

/// Session fields for creation (no id yet).
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub external_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub project: Option<String>,
    pub cwd: Option<String>,
    pub branch: Option<String>,
    pub model: Option<String>,
}

/// A single conversation turn. Immutable once written; ordered within a
/// session by `(ts, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_ref: String,
    pub ts: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    pub project: Option<String>,
}

/// A message ready for insertion (no id yet).
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_ref: String,
    pub ts: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub session_ref: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub decision: String,
    pub reasoning: Option<String>,
    pub alternatives: Option<String>,
    pub status: DecisionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub session_ref: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub problem: String,
    pub solution: Option<String>,
    pub prevention: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub session_ref: Option<String>,
    pub content: String,
    pub category: Option<String>,
    pub project: Option<String>,
    /// 1..=10, defaults to 5.
    pub importance: u8,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A curated extract over a contiguous span of messages. Forms a forest via
/// `parent`; `range_start..=range_end` are message ids within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub extract: String,
    pub range_start: Option<i64>,
    pub range_end: Option<i64>,
    pub parent: Option<i64>,
    pub session_ref: Option<String>,
    pub project: Option<String>,
    pub tags: Option<String>,
    pub message_count: Option<i64>,
}

/// Fields for creating a LoA entry. Range is trusted as supplied.
#[derive(Debug, Clone, Default)]
pub struct NewLoaEntry {
    pub title: String,
    pub description: Option<String>,
    pub extract: String,
    pub range_start: Option<i64>,
    pub range_end: Option<i64>,
    pub parent: Option<i64>,
    pub session_ref: Option<String>,
    pub project: Option<String>,
    pub tags: Option<String>,
    pub message_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelosEntry {
    pub id: i64,
    pub code: String,
    pub entry_type: TelosType,
    pub category: Option<String>,
    pub title: String,
    pub content: String,
    pub parent_code: Option<String>,
    pub source_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub doc_type: DocumentType,
    pub content: String,
    pub summary: Option<String>,
    pub size_bytes: i64,
    pub file_modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
