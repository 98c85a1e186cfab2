use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub extractor: ExtractorConfig,
    pub scanner: ScannerConfig,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory holding the database and the MEMORY/ artifact tree.
    pub base_dir: String,
    /// Database path. Defaults to `{base_dir}/memory.db`.
    pub db_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service (Ollama-compatible).
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Input ceiling in characters; longer texts are truncated before embedding.
    pub max_chars: usize,
}

/// How to invoke an external LLM extractor: a command reading the full prompt
/// on stdin and writing the summary to stdout.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorCommand {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorConfig {
    pub primary: ExtractorCommand,
    pub fallback: Option<ExtractorCommand>,
    /// Per-invocation timeout.
    pub timeout_secs: u64,
    /// Total budget for a chunked (multi-call) extraction.
    pub total_timeout_secs: u64,
    /// Normalized transcripts above this many chars are chunked.
    pub chunk_threshold_chars: usize,
    /// Maximum chars per chunk.
    pub chunk_size_chars: usize,
    /// Number of sessions kept in the hot-recall rotation file.
    pub hot_recall_sessions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// Root of the transcript file tree.
    pub transcript_root: String,
    /// Files smaller than this are skipped as trivial.
    pub min_size_bytes: u64,
    /// Upper bound of the preferred "medium" size tier.
    pub medium_max_bytes: u64,
    /// Sleep between extractions.
    pub sleep_secs: u64,
    /// Default per-invocation extraction limit.
    pub default_limit: usize,
    /// Per-extraction ceiling when running as a batch.
    pub batch_timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            extractor: ExtractorConfig::default(),
            scanner: ScannerConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir().to_string_lossy().into_owned(),
            db_path: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            timeout_secs: 180,
            max_chars: 30_000,
        }
    }
}

impl Default for ExtractorCommand {
    fn default() -> Self {
        Self {
            command: "claude".into(),
            args: vec!["-p".into()],
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            primary: ExtractorCommand::default(),
            fallback: None,
            timeout_secs: 300,
            total_timeout_secs: 600,
            chunk_threshold_chars: 120_000,
            chunk_size_chars: 80_000,
            hot_recall_sessions: 10,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
            .join("projects");
        Self {
            transcript_root: root.to_string_lossy().into_owned(),
            min_size_bytes: 2_000,
            medium_max_bytes: 500_000,
            sleep_secs: 5,
            default_limit: 10,
            batch_timeout_secs: 120,
        }
    }
}

/// Returns `~/.recollect/`
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".recollect")
}

/// Returns the default config file path: `~/.recollect/config.toml`
pub fn default_config_path() -> PathBuf {
    default_base_dir().join("config.toml")
}

impl MemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (BASE_DIR, MEM_DB_PATH,
    /// OLLAMA_URL, EMBEDDING_MODEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BASE_DIR") {
            self.storage.base_dir = val;
        }
        if let Ok(val) = std::env::var("MEM_DB_PATH") {
            self.storage.db_path = Some(val);
        }
        if let Ok(val) = std::env::var("OLLAMA_URL") {
            self.embedding.url = val;
        }
        if let Ok(val) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = val;
        }
    }

    /// Resolve the base directory, expanding `~` if needed.
    pub fn resolved_base_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.base_dir)
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.storage.db_path {
            Some(p) => expand_tilde(p),
            None => self.resolved_base_dir().join("memory.db"),
        }
    }

    /// Directory holding the rolling artifact files (DISTILLED.md etc.).
    pub fn memory_dir(&self) -> PathBuf {
        self.resolved_base_dir().join("MEMORY")
    }

    /// Resolve the transcript root, expanding `~` if needed.
    pub fn resolved_transcript_root(&self) -> PathBuf {
        expand_tilde(&self.scanner.transcript_root)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemoryConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.embedding.url, "http://localhost:11434");
        assert_eq!(config.embedding.max_chars, 30_000);
        assert_eq!(config.extractor.chunk_threshold_chars, 120_000);
        assert_eq!(config.scanner.min_size_bytes, 2_000);
        assert!(config.resolved_db_path().ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
log_level = "debug"

[storage]
base_dir = "/tmp/memtest"

[embedding]
url = "http://10.0.0.5:11434"
model = "mxbai-embed-large"

[extractor]
timeout_secs = 60

[extractor.primary]
command = "llm"
args = ["--system"]
"#;
        let config: MemoryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.base_dir, "/tmp/memtest");
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.extractor.timeout_secs, 60);
        assert_eq!(config.extractor.primary.command, "llm");
        // defaults still apply for unset fields
        assert_eq!(config.extractor.chunk_size_chars, 80_000);
        assert_eq!(config.scanner.default_limit, 10);
    }

    #[test]
    fn db_path_override_wins() {
        let mut config = MemoryConfig::default();
        config.storage.db_path = Some("/tmp/elsewhere.db".into());
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/elsewhere.db"));
    }

    #[test]
    fn memory_dir_under_base() {
        let mut config = MemoryConfig::default();
        config.storage.base_dir = "/tmp/base".into();
        assert_eq!(config.memory_dir(), PathBuf::from("/tmp/base/MEMORY"));
    }
}
