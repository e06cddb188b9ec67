//! Data validation command

use std::path::Path;

use anyhow::Result;
use tabled::Tabled;

use crate::context::AppContext;
use crate::output::{print_success, print_warning, OutputFormat};

/// Row for the validation error table
#[derive(Tabled)]
struct ErrorRow {
    #[tabled(rename = "Row")]
    row: usize,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Validate a CSV file against the schema and report every error found.
pub fn run(ctx: &AppContext, data: &Path, format: OutputFormat) -> Result<()> {
    let (rows, errors) = ctx.load_and_validate(data)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&errors)?);
        }
        OutputFormat::Table => {
            if errors.is_empty() {
                print_success(&format!(
                    "{} rows valid against schema {}",
                    rows.len(),
                    ctx.schema.version()
                ));
                return Ok(());
            }

            let table_rows: Vec<ErrorRow> = errors
                .iter()
                .map(|e| ErrorRow {
                    row: e.row,
                    column: e.column.clone(),
                    message: e.message.clone(),
                })
                .collect();
            let table = tabled::Table::new(table_rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            print_warning(&format!(
                "{} validation errors in {} rows",
                errors.len(),
                rows.len()
            ));
        }
    }

    Ok(())
}
