use recollect::engine::Engine;
use recollect::error::Result;
use recollect::model::SearchKind;

use super::print_hits;

/// Lexical full-text search.
pub fn search(
    engine: &Engine,
    query: &str,
    kind: Option<SearchKind>,
    project: Option<&str>,
    limit: usize,
) -> Result<()> {
    let hits = engine.search(query, kind, project, limit)?;
    print_hits(&hits);
    Ok(())
}

/// Vector-only search.
pub async fn semantic(
    engine: &Engine,
    query: &str,
    kind: Option<SearchKind>,
    limit: usize,
) -> Result<()> {
    let hits = engine.semantic(query, kind, limit).await?;
    print_hits(&hits);
    Ok(())
}

/// Hybrid search; notes when it degraded to keyword-only.
pub async fn hybrid(
    engine: &Engine,
    query: &str,
    kind: Option<SearchKind>,
    project: Option<&str>,
    limit: usize,
) -> Result<()> {
    let results = engine.hybrid(query, kind, project, limit).await?;
    if !results.embeddings_available {
        println!("(embedding service unavailable; keyword results only)\n");
    }
    print_hits(&results.hits);
    Ok(())
}
