mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use recollect::config::MemoryConfig;
use recollect::engine::Engine;
use recollect::error::{Error, Result};
use recollect::model::{DocumentType, SearchKind};

#[derive(Parser)]
#[command(
    name = "recollect",
    version,
    about = "Persistent cross-session memory for AI coding assistants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the memory store
    Init,
    /// Record a breadcrumb, decision, or learning
    Add {
        #[command(subcommand)]
        kind: AddCommand,
    },
    /// Full-text search across all memory kinds
    Search {
        query: String,
        #[arg(long)]
        project: Option<String>,
        /// Restrict to one kind (messages, decisions, learnings, breadcrumbs, loa, telos, docs)
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Semantic (vector) search
    Semantic {
        query: String,
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Hybrid search (keyword + semantic, RRF-fused)
    Hybrid {
        query: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List the most recent records of a kind
    Recent {
        /// Kind to list (defaults to breadcrumbs)
        kind: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show one record in full
    Show { kind: String, id: i64 },
    /// Store statistics
    Stats,
    /// Import sessions from the transcript tree
    Import {
        #[arg(long)]
        dry_run: bool,
        /// Actually import (without this, lists what would be imported)
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        verbose: bool,
    },
    /// Library of Alexandria: curated session extracts
    Loa {
        #[command(subcommand)]
        action: LoaCommand,
    },
    /// Re-ingest the active session and capture it as a LoA entry
    Dump {
        title: String,
        #[command(flatten)]
        flags: cli::loa::CaptureFlags,
    },
    /// Embedding management
    Embed {
        #[command(subcommand)]
        action: EmbedCommand,
    },
    /// Run the extraction pipeline
    Extract {
        #[command(subcommand)]
        action: ExtractCommand,
    },
    /// Import TELOS purpose-framework entries
    Telos {
        #[command(subcommand)]
        action: TelosCommand,
    },
    /// Import files as searchable documents
    Docs {
        #[command(subcommand)]
        action: DocsCommand,
    },
    /// Bare query: hybrid search
    #[command(external_subcommand)]
    Query(Vec<String>),
}

#[derive(Subcommand)]
enum AddCommand {
    /// A short note about where work left off
    Breadcrumb {
        text: String,
        #[command(flatten)]
        flags: cli::add::AddFlags,
        /// 1..=10, default 5
        #[arg(long)]
        importance: Option<u8>,
    },
    /// A decision and its rationale
    Decision {
        text: String,
        #[command(flatten)]
        flags: cli::add::AddFlags,
        #[arg(long)]
        reasoning: Option<String>,
        #[arg(long)]
        alternatives: Option<String>,
    },
    /// A problem and how it was solved
    Learning {
        text: String,
        #[command(flatten)]
        flags: cli::add::AddFlags,
        #[arg(long)]
        solution: Option<String>,
        #[arg(long)]
        prevention: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
}

#[derive(Subcommand)]
enum LoaCommand {
    /// Capture messages since the last entry
    Write {
        title: String,
        #[command(flatten)]
        flags: cli::loa::CaptureFlags,
    },
    /// Show one entry in full
    Show { id: i64 },
    /// Quote the raw messages behind an entry
    Quote { id: i64 },
    /// List recent entries
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum EmbedCommand {
    /// Embed rows that have no vector yet
    Backfill {
        #[arg(long)]
        table: Option<String>,
        #[arg(long, default_value_t = 500)]
        limit: usize,
        /// Re-embed rows that already have vectors
        #[arg(long)]
        force: bool,
    },
    /// Vector counts and service health
    Stats,
}

#[derive(Subcommand)]
enum ExtractCommand {
    /// Extract one transcript file
    File {
        path: PathBuf,
        /// Working directory of the session, for project detection
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Ignore dedup and cooldown state
        #[arg(long)]
        force: bool,
    },
    /// Walk the transcript tree and extract candidates
    Scan {
        #[arg(long)]
        limit: Option<usize>,
        /// No per-run extraction cap
        #[arg(long)]
        unlimited: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum TelosCommand {
    /// Import entries from a `## CODE: Title` markdown file
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum DocsCommand {
    /// Import one file
    Import {
        path: PathBuf,
        /// diary, reference, wisdom, plan, memory, enterprise, other
        #[arg(long = "type", default_value = "reference")]
        doc_type: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match MemoryConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    // Log to stderr so stdout stays clean for command output.
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Command, config: MemoryConfig) -> Result<()> {
    match command {
        Command::Init => cli::init(config),
        Command::Add { kind } => {
            let engine = Engine::open(config)?;
            match kind {
                AddCommand::Breadcrumb { text, flags, importance } => {
                    cli::add::breadcrumb(&engine, &text, &flags, importance)
                }
                AddCommand::Decision { text, flags, reasoning, alternatives } => cli::add::decision(
                    &engine,
                    &text,
                    &flags,
                    reasoning.as_deref(),
                    alternatives.as_deref(),
                ),
                AddCommand::Learning { text, flags, solution, prevention, tags } => {
                    cli::add::learning(
                        &engine,
                        &text,
                        &flags,
                        solution.as_deref(),
                        prevention.as_deref(),
                        tags.as_deref(),
                    )
                }
            }
        }
        Command::Search { query, project, table, limit } => {
            let engine = Engine::open(config)?;
            cli::search::search(&engine, &query, parse_kind(table.as_deref())?, project.as_deref(), limit)
        }
        Command::Semantic { query, table, limit } => {
            let engine = Engine::open(config)?;
            cli::search::semantic(&engine, &query, parse_kind(table.as_deref())?, limit).await
        }
        Command::Hybrid { query, project, table, limit } => {
            let engine = Engine::open(config)?;
            cli::search::hybrid(&engine, &query, parse_kind(table.as_deref())?, project.as_deref(), limit)
                .await
        }
        Command::Query(words) => {
            let query = words.join(" ");
            let engine = Engine::open(config)?;
            cli::search::hybrid(&engine, &query, None, None, 10).await
        }
        Command::Recent { kind, project, limit } => {
            let engine = Engine::open(config)?;
            let kind = parse_kind(kind.as_deref())?.unwrap_or(SearchKind::Breadcrumbs);
            cli::records::recent(&engine, kind, project.as_deref(), limit)
        }
        Command::Show { kind, id } => {
            let engine = Engine::open(config)?;
            let kind = parse_kind(Some(kind.as_str()))?.expect("kind is required");
            cli::records::show(&engine, kind, id)
        }
        Command::Stats => {
            let engine = Engine::open(config)?;
            cli::records::stats(&engine)
        }
        Command::Import { dry_run, yes, verbose } => {
            let engine = Engine::open(config)?;
            if dry_run || !yes {
                cli::imports::sessions(&engine, true, verbose)?;
                if !dry_run {
                    println!("\nRe-run with --yes to import.");
                }
                Ok(())
            } else {
                cli::imports::sessions(&engine, false, verbose)
            }
        }
        Command::Loa { action } => {
            let engine = Engine::open(config)?;
            match action {
                LoaCommand::Write { title, flags } => cli::loa::write(&engine, &title, &flags).await,
                LoaCommand::Show { id } => cli::loa::show(&engine, id),
                LoaCommand::Quote { id } => cli::loa::quote(&engine, id),
                LoaCommand::List { limit } => cli::loa::list(&engine, limit),
            }
        }
        Command::Dump { title, flags } => {
            let engine = Engine::open(config)?;
            cli::loa::dump(&engine, &title, &flags).await
        }
        Command::Embed { action } => {
            let engine = Engine::open(config)?;
            match action {
                EmbedCommand::Backfill { table, limit, force } => {
                    cli::embed::backfill(&engine, parse_kind(table.as_deref())?, limit, force).await
                }
                EmbedCommand::Stats => cli::embed::stats(&engine).await,
            }
        }
        Command::Extract { action } => match action {
            ExtractCommand::File { path, cwd, force } => {
                cli::extraction::file(&config, &path, cwd.as_deref(), force).await
            }
            ExtractCommand::Scan { limit, unlimited, dry_run } => {
                let limit = if unlimited {
                    None
                } else {
                    Some(limit.unwrap_or(config.scanner.default_limit))
                };
                cli::extraction::scan(&config, limit, dry_run).await
            }
        },
        Command::Telos { action } => {
            let engine = Engine::open(config)?;
            match action {
                TelosCommand::Import { path } => cli::imports::telos(&engine, &path),
            }
        }
        Command::Docs { action } => {
            let engine = Engine::open(config)?;
            match action {
                DocsCommand::Import { path, doc_type } => {
                    let doc_type = DocumentType::from_str(&doc_type)
                        .map_err(Error::InvalidInput)?;
                    cli::imports::document(&engine, &path, doc_type)
                }
            }
        }
    }
}

/// Parse an optional `--table`/kind argument into a [`SearchKind`].
fn parse_kind(raw: Option<&str>) -> Result<Option<SearchKind>> {
    match raw {
        None => Ok(None),
        Some(s) => SearchKind::from_str(s)
            .map(Some)
            .map_err(Error::InvalidInput),
    }
}
