use recollect::engine::{Engine, LoaWriteOptions};
use recollect::error::Result;

/// Shared flags for `loa write` and `dump`.
#[derive(Debug, Default, clap::Args)]
pub struct CaptureFlags {
    /// Project label for the entry
    #[arg(long)]
    pub project: Option<String>,
    /// Parent LoA entry id this capture continues
    #[arg(long)]
    pub continues: Option<i64>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Capture only the newest N uncovered messages
    #[arg(long)]
    pub limit: Option<usize>,
    /// Store the raw conversation instead of calling the extractor
    #[arg(long)]
    pub skip_extract: bool,
}

impl CaptureFlags {
    pub fn to_options(&self) -> LoaWriteOptions {
        LoaWriteOptions {
            description: None,
            project: self.project.clone(),
            continues: self.continues,
            tags: self.tags.clone(),
            limit: self.limit,
            skip_extract: self.skip_extract,
        }
    }
}

pub async fn write(engine: &Engine, title: &str, flags: &CaptureFlags) -> Result<()> {
    let entry = engine.loa_write(title, &flags.to_options()).await?;
    println!(
        "LoA #{} \"{}\" captured ({} messages, range {}..{}).",
        entry.id,
        entry.title,
        entry.message_count.unwrap_or(0),
        entry.range_start.unwrap_or(0),
        entry.range_end.unwrap_or(0),
    );
    Ok(())
}

pub async fn dump(engine: &Engine, title: &str, flags: &CaptureFlags) -> Result<()> {
    let entry = engine.dump(title, &flags.to_options()).await?;
    println!(
        "Session re-ingested and captured as LoA #{} \"{}\" ({} messages).",
        entry.id,
        entry.title,
        entry.message_count.unwrap_or(0),
    );
    Ok(())
}

pub fn show(engine: &Engine, id: i64) -> Result<()> {
    let entry = engine.loa_show(id)?;
    println!("{}", render(&entry));
    Ok(())
}

pub fn quote(engine: &Engine, id: i64) -> Result<()> {
    let messages = engine.loa_quote(id)?;
    if messages.is_empty() {
        println!("Entry #{id} has no quotable range.");
        return Ok(());
    }
    for message in messages {
        println!("[{}] {} {}", message.role, message.ts.to_rfc3339(), message.content);
        println!();
    }
    Ok(())
}

pub fn list(engine: &Engine, limit: usize) -> Result<()> {
    let entries = engine.loa_list(limit)?;
    if entries.is_empty() {
        println!("No LoA entries yet. Capture one with `recollect loa write <title>`.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "  #{:<4} {}  {} ({} messages){}",
            entry.id,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.title,
            entry.message_count.unwrap_or(0),
            entry
                .project
                .as_deref()
                .map(|p| format!("  [{p}]"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

fn render(entry: &recollect::model::LoaEntry) -> String {
    let range = match (entry.range_start, entry.range_end) {
        (Some(s), Some(e)) => format!("{s}..{e}"),
        _ => "-".into(),
    };
    format!(
        "LoA #{}: {}\n  range: {}\n  created: {}\n\n{}",
        entry.id,
        entry.title,
        range,
        entry.created_at.to_rfc3339(),
        entry.extract,
    )
}
