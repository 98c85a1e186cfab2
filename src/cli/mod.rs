//! Terminal command implementations, one module per command group. Each is
//! a thin rendering layer over [`recollect::engine::Engine`].

pub mod add;
pub mod embed;
pub mod extraction;
pub mod imports;
pub mod loa;
pub mod records;
pub mod search;

use recollect::error::Result;
use recollect::search::SearchHit;

/// Shared result renderer for search/semantic/hybrid output.
pub fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{}#{}] {} (score: {:.4}, {})",
            i + 1,
            hit.kind,
            hit.id,
            hit.created_at,
            hit.score,
            hit.source.as_str(),
        );
        println!("     {}", hit.content.replace('\n', " "));
        if let Some(project) = &hit.project {
            println!("     project: {project}");
        }
        println!();
    }
}

/// Initialize (or upgrade) the store.
pub fn init(config: recollect::config::MemoryConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let (_engine, created) = recollect::engine::Engine::init(config)?;
    if created {
        println!("Initialized memory store at {}", db_path.display());
    } else {
        println!("Memory store already initialized at {}", db_path.display());
    }
    Ok(())
}
