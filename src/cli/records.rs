use recollect::engine::Engine;
use recollect::error::Result;
use recollect::model::SearchKind;

/// List the most recent records of a kind.
pub fn recent(
    engine: &Engine,
    kind: SearchKind,
    project: Option<&str>,
    limit: usize,
) -> Result<()> {
    let items = engine.recent(kind, project, limit)?;
    if items.is_empty() {
        println!("Nothing recorded yet.");
        return Ok(());
    }

    for item in items {
        let preview: String = item.preview.chars().take(100).collect();
        println!(
            "  #{:<5} {}  {}{}",
            item.id,
            item.created_at,
            preview.replace('\n', " "),
            item.project
                .as_deref()
                .map(|p| format!("  [{p}]"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Render one record in full.
pub fn show(engine: &Engine, kind: SearchKind, id: i64) -> Result<()> {
    println!("{}", engine.show(kind, id)?);
    Ok(())
}

/// Display store statistics.
pub fn stats(engine: &Engine) -> Result<()> {
    let stats = engine.stats()?;

    println!("Memory Store Statistics");
    println!("{}", "=".repeat(40));
    println!("  Sessions:      {}", stats.sessions);
    println!("  Messages:      {}", stats.messages);
    println!("  LoA entries:   {}", stats.loa_entries);
    println!("  Decisions:     {}", stats.decisions);
    println!("  Learnings:     {}", stats.learnings);
    println!("  Breadcrumbs:   {}", stats.breadcrumbs);
    println!("  TELOS entries: {}", stats.telos_entries);
    println!("  Documents:     {}", stats.documents);
    println!("  Embeddings:    {}", stats.embeddings);
    println!();
    println!("Database size:   {} bytes", stats.db_size_bytes);
    Ok(())
}
