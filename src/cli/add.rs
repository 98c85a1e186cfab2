use recollect::engine::Engine;
use recollect::error::Result;
use recollect::repo::records::{BreadcrumbFields, DecisionFields, LearningFields};

/// Shared optional flags for the three `add` record kinds.
#[derive(Debug, Default, clap::Args)]
pub struct AddFlags {
    /// Project label to attach
    #[arg(long)]
    pub project: Option<String>,
    /// Free-form category
    #[arg(long)]
    pub category: Option<String>,
    /// Session external id this record came from
    #[arg(long)]
    pub session: Option<String>,
}

pub fn breadcrumb(
    engine: &Engine,
    content: &str,
    flags: &AddFlags,
    importance: Option<u8>,
) -> Result<()> {
    let id = engine.add_breadcrumb(
        content,
        &BreadcrumbFields {
            category: flags.category.as_deref(),
            project: flags.project.as_deref(),
            session_ref: flags.session.as_deref(),
            importance,
            expires_at: None,
        },
    )?;
    println!("Breadcrumb #{id} recorded.");
    Ok(())
}

pub fn decision(
    engine: &Engine,
    text: &str,
    flags: &AddFlags,
    reasoning: Option<&str>,
    alternatives: Option<&str>,
) -> Result<()> {
    let id = engine.add_decision(
        text,
        &DecisionFields {
            reasoning,
            alternatives,
            category: flags.category.as_deref(),
            project: flags.project.as_deref(),
            session_ref: flags.session.as_deref(),
        },
    )?;
    println!("Decision #{id} recorded.");
    Ok(())
}

pub fn learning(
    engine: &Engine,
    problem: &str,
    flags: &AddFlags,
    solution: Option<&str>,
    prevention: Option<&str>,
    tags: Option<&str>,
) -> Result<()> {
    let id = engine.add_learning(
        problem,
        &LearningFields {
            solution,
            prevention,
            tags,
            category: flags.category.as_deref(),
            project: flags.project.as_deref(),
            session_ref: flags.session.as_deref(),
        },
    )?;
    println!("Learning #{id} recorded.");
    Ok(())
}
