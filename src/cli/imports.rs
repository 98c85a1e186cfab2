use std::path::Path;

use recollect::engine::Engine;
use recollect::error::Result;
use recollect::model::DocumentType;

/// Bulk-import sessions from the transcript tree.
pub fn sessions(engine: &Engine, dry_run: bool, verbose: bool) -> Result<()> {
    let report = engine.import_sessions(dry_run, verbose)?;
    if dry_run {
        println!(
            "Would import {} session(s) with {} message(s); {} skipped.",
            report.imported, report.messages, report.skipped
        );
    } else {
        println!(
            "Imported {} session(s) with {} message(s); {} skipped.",
            report.imported, report.messages, report.skipped
        );
    }
    Ok(())
}

/// Import TELOS entries from a markdown file.
pub fn telos(engine: &Engine, path: &Path) -> Result<()> {
    let count = engine.telos_import(path)?;
    println!("Imported {count} TELOS entr{}.", if count == 1 { "y" } else { "ies" });
    Ok(())
}

/// Import a file as a searchable document.
pub fn document(engine: &Engine, path: &Path, doc_type: DocumentType) -> Result<()> {
    let id = engine.docs_import(path, doc_type)?;
    println!("Imported document #{id} ({}).", doc_type);
    Ok(())
}
