//! The engine facade: the stable surface the CLI and tool-protocol layers
//! consume.
//!
//! Owns the single database handle and the embedding client. Every method is
//! a thin orchestration over the repository, search, and extraction modules.
//! Long-running I/O (embedding HTTP, LLM subprocess) never runs while the
//! connection lock is held.

use chrono::Utc;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::config::MemoryConfig;
use crate::db;
use crate::embedding::client::{EmbeddingClient, EmbeddingHealth};
use crate::embedding::store as vectors;
use crate::error::{Error, Result};
use crate::extract::llm;
use crate::ingest::{self, ImportReport};
use crate::model::{
    DocumentType, LoaEntry, Message, NewLoaEntry, Role, SearchKind, TelosType,
};
use crate::repo::imports::{NewDocument, NewTelosEntry};
use crate::repo::records::{
    BreadcrumbFields, DecisionFields, LearningFields, RecentItem, StoreStats,
};
use crate::repo::{imports, loa, records, sessions};
use crate::search::hybrid::{rrf_fuse, semantic_from_vector, HybridResults};
use crate::search::lexical::lexical_search;
use crate::search::SearchHit;

/// Options for `loa write` and the capture half of `dump`.
#[derive(Debug, Default, Clone)]
pub struct LoaWriteOptions {
    pub description: Option<String>,
    pub project: Option<String>,
    /// Parent entry id; chains captures into a thread.
    pub continues: Option<i64>,
    pub tags: Option<String>,
    /// Capture only the newest N uncovered messages.
    pub limit: Option<usize>,
    /// Store the raw flattened conversation instead of calling the extractor.
    pub skip_extract: bool,
}

/// Tally of an `embed backfill` run.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub embedded: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct Engine {
    config: MemoryConfig,
    conn: Mutex<Connection>,
    embedding: EmbeddingClient,
}

impl Engine {
    /// Open an existing store. Fails with [`Error::NotInitialized`] if `init`
    /// has never run for this path.
    pub fn open(config: MemoryConfig) -> Result<Self> {
        let conn = db::open_database(config.resolved_db_path())?;
        Self::build(config, conn)
    }

    /// Create or upgrade the store. Returns the engine and whether the
    /// database file was newly created.
    pub fn init(config: MemoryConfig) -> Result<(Self, bool)> {
        let (conn, created) = db::init_database(config.resolved_db_path())?;
        Ok((Self::build(config, conn)?, created))
    }

    fn build(config: MemoryConfig, conn: Connection) -> Result<Self> {
        let embedding = EmbeddingClient::new(&config.embedding)?;
        Ok(Self {
            config,
            conn: Mutex::new(conn),
            embedding,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("engine connection lock poisoned")
    }

    // ── Structured records ───────────────────────────────────────────────

    pub fn add_decision(&self, text: &str, fields: &DecisionFields<'_>) -> Result<i64> {
        records::add_decision(&self.conn(), text, fields)
    }

    pub fn add_learning(&self, problem: &str, fields: &LearningFields<'_>) -> Result<i64> {
        records::add_learning(&self.conn(), problem, fields)
    }

    pub fn add_breadcrumb(&self, content: &str, fields: &BreadcrumbFields<'_>) -> Result<i64> {
        records::add_breadcrumb(&self.conn(), content, fields)
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Lexical search over one kind or all of them.
    pub fn search(
        &self,
        query: &str,
        kind: Option<SearchKind>,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let kinds = kind_set(kind);
        lexical_search(&self.conn(), query, kinds, project, limit)
    }

    /// Vector-only search. The query is embedded before the store lock is
    /// taken.
    pub async fn semantic(
        &self,
        query: &str,
        kind: Option<SearchKind>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedded = self.embedding.embed(query).await?;
        semantic_from_vector(&self.conn(), &embedded.vector, kind, limit)
    }

    /// Hybrid search; degrades to lexical-only when embeddings are down and
    /// reports that through `embeddings_available`.
    pub async fn hybrid(
        &self,
        query: &str,
        kind: Option<SearchKind>,
        project: Option<&str>,
        limit: usize,
    ) -> Result<HybridResults> {
        let kinds = kind_set(kind);

        let embedded = match self.embedding.embed(query).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::debug!(error = %e, "embedding unavailable, degrading to lexical-only");
                None
            }
        };

        let conn = self.conn();
        let lexical = lexical_search(&conn, query, kinds, project, limit * 2)?;

        let Some(embedded) = embedded else {
            let mut hits = lexical;
            hits.truncate(limit);
            return Ok(HybridResults {
                hits,
                embeddings_available: false,
            });
        };

        let semantic = semantic_from_vector(&conn, &embedded.vector, kind, limit * 2)?;
        Ok(HybridResults {
            hits: rrf_fuse(&lexical, &semantic, limit),
            embeddings_available: true,
        })
    }

    pub fn recent(
        &self,
        kind: SearchKind,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecentItem>> {
        records::recent(&self.conn(), kind, project, limit)
    }

    /// Fetch one record and render it for display.
    pub fn show(&self, kind: SearchKind, id: i64) -> Result<String> {
        let conn = self.conn();
        let rendered = match kind {
            SearchKind::Messages => {
                let m = conn
                    .query_row(
                        "SELECT id, session_ref, ts, role, content, project FROM messages WHERE id = ?1",
                        rusqlite::params![id],
                        crate::repo::sessions::map_message,
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => {
                            Error::NotFound { kind: "message", id }
                        }
                        other => other.into(),
                    })?;
                render_message(&m)
            }
            SearchKind::Decisions => {
                let d = records::get_decision(&conn, id)?;
                format!(
                    "decision #{} [{}] {}\n  project: {}\n  reasoning: {}\n  alternatives: {}\n  recorded: {}",
                    d.id,
                    d.status,
                    d.decision,
                    d.project.as_deref().unwrap_or("-"),
                    d.reasoning.as_deref().unwrap_or("-"),
                    d.alternatives.as_deref().unwrap_or("-"),
                    d.created_at.to_rfc3339(),
                )
            }
            SearchKind::Learnings => {
                let l = records::get_learning(&conn, id)?;
                format!(
                    "learning #{} {}\n  solution: {}\n  prevention: {}\n  tags: {}\n  project: {}\n  recorded: {}",
                    l.id,
                    l.problem,
                    l.solution.as_deref().unwrap_or("-"),
                    l.prevention.as_deref().unwrap_or("-"),
                    l.tags.as_deref().unwrap_or("-"),
                    l.project.as_deref().unwrap_or("-"),
                    l.created_at.to_rfc3339(),
                )
            }
            SearchKind::Breadcrumbs => {
                let b = records::get_breadcrumb(&conn, id)?;
                format!(
                    "breadcrumb #{} (importance {}) {}\n  category: {}\n  project: {}\n  recorded: {}",
                    b.id,
                    b.importance,
                    b.content,
                    b.category.as_deref().unwrap_or("-"),
                    b.project.as_deref().unwrap_or("-"),
                    b.created_at.to_rfc3339(),
                )
            }
            SearchKind::Loa => render_loa(&loa::get_loa(&conn, id)?),
            SearchKind::Telos => {
                let t = imports::get_telos(&conn, id)?;
                format!(
                    "telos {} [{}] {}\n\n{}",
                    t.code, t.entry_type, t.title, t.content
                )
            }
            SearchKind::Documents => {
                let d = imports::get_document(&conn, id)?;
                format!(
                    "document #{} [{}] {}\n  path: {}\n  {} bytes\n\n{}",
                    d.id, d.doc_type, d.title, d.path, d.size_bytes, d.content
                )
            }
        };
        Ok(rendered)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        records::store_stats(&self.conn(), Some(&self.config.resolved_db_path()))
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    pub fn import_sessions(&self, dry_run: bool, verbose: bool) -> Result<ImportReport> {
        let root = self.config.resolved_transcript_root();
        ingest::import_sessions(&mut self.conn(), &root, dry_run, verbose)
    }

    // ── LoA capture ──────────────────────────────────────────────────────

    /// Capture the messages since the last LoA entry (or a bounded tail)
    /// into a new entry, then embed it best-effort.
    pub async fn loa_write(&self, title: &str, opts: &LoaWriteOptions) -> Result<LoaEntry> {
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("loa title is empty".into()));
        }

        // Read phase: collect the span, then release the lock before any
        // extractor or embedding call.
        let span = loa::messages_since_last_loa(&self.conn(), opts.limit)?;
        if span.messages.is_empty() {
            return Err(Error::InvalidInput("no new messages to capture".into()));
        }

        let flattened = flatten_messages(&span.messages);
        let extract = if opts.skip_extract {
            flattened
        } else {
            match llm::extract_with_fallback(
                &self.config.extractor,
                llm::LOA_SYSTEM_PROMPT,
                &flattened,
            )
            .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "extractor unavailable, storing raw capture");
                    flattened
                }
            }
        };

        let session_ref = span.messages.first().map(|m| m.session_ref.clone());
        let project = opts
            .project
            .clone()
            .or_else(|| span.messages.iter().find_map(|m| m.project.clone()));

        let entry = NewLoaEntry {
            title: title.to_string(),
            description: opts.description.clone(),
            extract,
            range_start: span.start_id,
            range_end: span.end_id,
            parent: opts.continues,
            session_ref,
            project,
            tags: opts.tags.clone(),
            message_count: Some(span.messages.len() as i64),
        };

        let id = loa::create_loa_entry(&self.conn(), &entry)?;
        let stored = loa::get_loa(&self.conn(), id)?;

        // Auto-embed. Losing this only degrades semantic recall, so an
        // unreachable embedding service is not an error here.
        let text = crate::search::loa_preview(&stored.title, &stored.extract);
        match self.embedding.embed(&text).await {
            Ok(result) => {
                vectors::upsert_embedding(
                    &self.conn(),
                    SearchKind::Loa,
                    id,
                    &result.model,
                    &result.vector,
                )?;
            }
            Err(e) => tracing::warn!(error = %e, "auto-embed skipped"),
        }

        Ok(stored)
    }

    /// Re-ingest the currently-active transcript (replacing any prior rows
    /// for its session id) and capture it as a LoA entry.
    pub async fn dump(&self, title: &str, opts: &LoaWriteOptions) -> Result<LoaEntry> {
        let transcript = self.active_transcript()?;
        let parsed = ingest::parse_session_file(&transcript)?;

        {
            let mut conn = self.conn();
            if sessions::session_exists(&conn, &parsed.session.external_id)? {
                let deleted =
                    sessions::delete_session_cascade(&mut conn, &parsed.session.external_id)?;
                tracing::info!(
                    session = %parsed.session.external_id,
                    deleted,
                    "replaced prior ingestion"
                );
            }
            ingest::ingest_session(&mut conn, &parsed)?;
        }

        self.loa_write(title, opts).await
    }

    /// The newest transcript for the current working directory's encoded
    /// project folder.
    fn active_transcript(&self) -> Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        let encoded = encode_project_dir(&cwd);
        let dir = self.config.resolved_transcript_root().join(encoded);

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        let entries = std::fs::read_dir(&dir).map_err(|_| {
            Error::InvalidInput(format!(
                "no transcripts found for this directory (looked in {})",
                dir.display()
            ))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("agent-") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            if newest.as_ref().map(|(t, _)| mtime > *t).unwrap_or(true) {
                newest = Some((mtime, path));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| Error::InvalidInput("no active session transcript found".into()))
    }

    pub fn loa_show(&self, id: i64) -> Result<LoaEntry> {
        loa::get_loa(&self.conn(), id)
    }

    pub fn loa_quote(&self, id: i64) -> Result<Vec<Message>> {
        loa::loa_messages(&self.conn(), id)
    }

    pub fn loa_list(&self, limit: usize) -> Result<Vec<LoaEntry>> {
        loa::loa_list(&self.conn(), limit)
    }

    // ── Embeddings ───────────────────────────────────────────────────────

    /// Embed rows that have no vector yet (all rows with `force`), across
    /// one kind or every kind, up to `limit` rows total.
    pub async fn embed_backfill(
        &self,
        kind: Option<SearchKind>,
        limit: usize,
        force: bool,
    ) -> Result<BackfillReport> {
        let kinds = kind_set(kind);
        let mut report = BackfillReport::default();

        for &kind in kinds {
            if report.embedded >= limit {
                break;
            }
            let remaining = limit - report.embedded;
            let pending = vectors::rows_to_embed(&self.conn(), kind, remaining, force)?;

            for (id, text) in pending {
                if text.trim().is_empty() {
                    report.skipped += 1;
                    continue;
                }
                let result = self.embedding.embed(&text).await?;
                vectors::upsert_embedding(&self.conn(), kind, id, &result.model, &result.vector)?;
                report.embedded += 1;
                tracing::debug!(kind = %kind, id, "embedded");
            }
        }

        Ok(report)
    }

    pub fn embed_stats(&self) -> Result<vectors::EmbeddingStats> {
        vectors::embedding_stats(&self.conn())
    }

    pub async fn embedding_health(&self) -> EmbeddingHealth {
        self.embedding.health().await
    }

    // ── Optional imports ─────────────────────────────────────────────────

    /// Import TELOS entries from a markdown file of `## CODE: Title`
    /// sections. Returns the number of entries upserted.
    pub fn telos_import(&self, path: &std::path::Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let source = path.to_string_lossy().into_owned();
        let entries = parse_telos_markdown(&raw, &source);
        if entries.is_empty() {
            return Err(Error::InvalidInput(
                "no `## CODE: Title` sections found".into(),
            ));
        }

        let conn = self.conn();
        for entry in &entries {
            imports::upsert_telos_entry(&conn, entry)?;
        }
        Ok(entries.len())
    }

    /// Import one file as a document. Returns the document id.
    pub fn docs_import(&self, path: &std::path::Path, doc_type: DocumentType) -> Result<i64> {
        let content = std::fs::read_to_string(path)?;
        let meta = std::fs::metadata(path)?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let file_modified_at = meta
            .modified()
            .ok()
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        imports::upsert_document(
            &self.conn(),
            &NewDocument {
                path: path.to_string_lossy().into_owned(),
                title,
                doc_type,
                content,
                summary: None,
                size_bytes: meta.len() as i64,
                file_modified_at,
            },
        )
    }
}

/// One kind, or all of them.
fn kind_set(kind: Option<SearchKind>) -> &'static [SearchKind] {
    match kind {
        Some(SearchKind::Messages) => &[SearchKind::Messages],
        Some(SearchKind::Decisions) => &[SearchKind::Decisions],
        Some(SearchKind::Learnings) => &[SearchKind::Learnings],
        Some(SearchKind::Breadcrumbs) => &[SearchKind::Breadcrumbs],
        Some(SearchKind::Loa) => &[SearchKind::Loa],
        Some(SearchKind::Telos) => &[SearchKind::Telos],
        Some(SearchKind::Documents) => &[SearchKind::Documents],
        None => &SearchKind::ALL,
    }
}

/// `/Users/dev/widgets` → `-Users-dev-widgets`, the transcript folder naming.
fn encode_project_dir(dir: &std::path::Path) -> String {
    dir.to_string_lossy().replace(['/', '\\'], "-")
}

fn flatten_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => "SYSTEM",
            };
            format!("[{role}]: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_message(m: &Message) -> String {
    format!(
        "message #{} [{}] {} ({})\n{}",
        m.id,
        m.role,
        m.session_ref,
        m.ts.to_rfc3339(),
        m.content
    )
}

fn render_loa(entry: &LoaEntry) -> String {
    let range = match (entry.range_start, entry.range_end) {
        (Some(s), Some(e)) => format!("{s}..{e}"),
        _ => "-".into(),
    };
    format!(
        "loa #{} {}\n  range: {} ({} messages)\n  project: {}\n  tags: {}\n  created: {}\n\n{}",
        entry.id,
        entry.title,
        range,
        entry.message_count.unwrap_or(0),
        entry.project.as_deref().unwrap_or("-"),
        entry.tags.as_deref().unwrap_or("-"),
        entry.created_at.to_rfc3339(),
        entry.extract,
    )
}

/// Parse `## CODE: Title` markdown sections into TELOS entries. The type is
/// inferred from the code's alphabetic prefix.
fn parse_telos_markdown(raw: &str, source_file: &str) -> Vec<NewTelosEntry> {
    let mut entries = Vec::new();
    let mut current: Option<(String, String, Vec<String>)> = None;

    let flush = |current: &mut Option<(String, String, Vec<String>)>,
                 entries: &mut Vec<NewTelosEntry>| {
        if let Some((code, title, body)) = current.take() {
            let content = body.join("\n").trim().to_string();
            if !content.is_empty() || !title.is_empty() {
                entries.push(NewTelosEntry {
                    entry_type: TelosType::from_code(&code),
                    code,
                    category: None,
                    title,
                    content,
                    parent_code: None,
                    source_file: Some(source_file.to_string()),
                });
            }
        }
    };

    for line in raw.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            flush(&mut current, &mut entries);
            if let Some((code, title)) = heading.split_once(':') {
                let code = code.trim();
                if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric()) {
                    current = Some((code.to_string(), title.trim().to_string(), Vec::new()));
                }
            }
            continue;
        }
        if let Some((_, _, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }
    flush(&mut current, &mut entries);
    entries
}
