//! Model lifecycle commands

use std::path::Path;

use anyhow::Result;
use tabled::Tabled;

use crate::context::AppContext;
use crate::output::{print_success, print_warning, OutputFormat};

/// Row for the archive listing table
#[derive(Tabled)]
struct ArchiveRow {
    #[tabled(rename = "Archived Model")]
    name: String,
}

/// Validate a model file with a throwaway session; the serving model is
/// never affected.
pub fn validate(ctx: &AppContext, path: &Path, format: OutputFormat) -> Result<()> {
    let engine = ctx.engine()?;
    let lifecycle = ctx.lifecycle(engine.clone());
    let issues = lifecycle.validate_model(path);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&issues)?);
        }
        OutputFormat::Table => {
            if issues.is_empty() {
                print_success(&format!("{} is servable", path.display()));
            } else {
                for issue in &issues {
                    print_warning(&issue.message);
                }
            }
        }
    }

    engine.close();
    Ok(())
}

/// Archive the current model under a timestamped name.
pub fn archive(ctx: &AppContext, name: &str, format: OutputFormat) -> Result<()> {
    let engine = ctx.engine()?;
    let lifecycle = ctx.lifecycle(engine.clone());
    let entry = lifecycle.archive_model(name)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "archived {} -> {}",
                entry.original_path.display(),
                entry.archived_path.display()
            ));
        }
    }

    engine.close();
    Ok(())
}

/// Validate and promote a new model to CURRENT.
pub fn switch(ctx: &AppContext, path: &Path) -> Result<()> {
    let engine = ctx.engine()?;
    let lifecycle = ctx.lifecycle(engine.clone());

    let issues = lifecycle.validate_model(path);
    if !issues.is_empty() {
        for issue in &issues {
            print_warning(&issue.message);
        }
        anyhow::bail!("model {} failed validation, not switching", path.display());
    }

    lifecycle.switch_model(path)?;
    print_success(&format!(
        "current model now backed by {}",
        lifecycle.current_path().display()
    ));

    engine.close();
    Ok(())
}

/// Show the current model path and the archive contents.
pub fn status(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let engine = ctx.engine()?;
    let lifecycle = ctx.lifecycle(engine.clone());
    let archived = lifecycle.list_archive()?;

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "current": lifecycle.current_path(),
                "archive": archived,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            print_success(&format!("current: {}", lifecycle.current_path().display()));
            if archived.is_empty() {
                print_warning("archive is empty");
            } else {
                let rows: Vec<ArchiveRow> = archived
                    .iter()
                    .map(|p| ArchiveRow {
                        name: p
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_else(|| p.display().to_string()),
                    })
                    .collect();
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }
        }
    }

    engine.close();
    Ok(())
}
