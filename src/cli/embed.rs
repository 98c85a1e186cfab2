use recollect::engine::Engine;
use recollect::error::Result;
use recollect::model::SearchKind;

/// Embed rows that are missing vectors.
pub async fn backfill(
    engine: &Engine,
    kind: Option<SearchKind>,
    limit: usize,
    force: bool,
) -> Result<()> {
    let health = engine.embedding_health().await;
    if !health.available {
        println!(
            "Embedding service not available at {} (model {}).",
            health.url, health.model
        );
        println!("Start it and pull the model, then re-run.");
        return Ok(());
    }

    let report = engine.embed_backfill(kind, limit, force).await?;
    println!(
        "Backfill complete: {} embedded, {} skipped (empty text).",
        report.embedded, report.skipped
    );
    Ok(())
}

/// Display embedding counts and service health.
pub async fn stats(engine: &Engine) -> Result<()> {
    let stats = engine.embed_stats()?;
    let health = engine.embedding_health().await;

    println!("Embeddings");
    println!("{}", "=".repeat(40));
    println!("  Total vectors: {}", stats.total);
    println!("  Total bytes:   {}", stats.total_bytes);
    for (kind, count) in &stats.by_kind {
        println!("  {kind:<14} {count}");
    }
    if !stats.models.is_empty() {
        println!("  Models:        {}", stats.models.join(", "));
    }
    println!();
    println!(
        "Service: {} ({}) — {}",
        health.url,
        health.model,
        if health.available { "available" } else { "unavailable" }
    );
    Ok(())
}
