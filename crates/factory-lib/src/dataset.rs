//! CSV dataset loading and header mapping
//!
//! CSV columns are matched against the schema by header name, not position,
//! so the exported column order of upstream tooling does not matter. Rows
//! come out positionally aligned to schema column order, ready for the
//! validator.

use std::path::Path;

use tracing::warn;

use crate::error::{FactoryError, FactoryResult};
use crate::schema::Schema;

/// Load a CSV file and align its rows to schema column order.
///
/// A schema column absent from the header row is a hard error: rows could
/// not be aligned, so nothing downstream would be meaningful. Extra input
/// columns are ignored with a warning.
pub fn load_csv(path: &Path, schema: &Schema) -> FactoryResult<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| map_csv_error(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| map_csv_error(path, e))?
        .clone();

    let mapping: Vec<usize> = schema
        .columns()
        .iter()
        .map(|spec| {
            headers
                .iter()
                .position(|h| h == spec.name)
                .ok_or_else(|| FactoryError::MissingColumn {
                    column: spec.name.clone(),
                    path: path.to_path_buf(),
                })
        })
        .collect::<FactoryResult<_>>()?;

    for header in headers.iter() {
        if schema.column(header).is_none() {
            warn!(column = %header, path = %path.display(), "CSV column not in schema, ignoring");
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| map_csv_error(path, e))?;
        rows.push(
            mapping
                .iter()
                .map(|&i| record.get(i).unwrap_or("").to_string())
                .collect(),
        );
    }

    tracing::info!(
        path = %path.display(),
        rows = rows.len(),
        columns = schema.columns().len(),
        "Dataset loaded"
    );
    Ok(rows)
}

fn map_csv_error(path: &Path, error: csv::Error) -> FactoryError {
    let detail = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(source) => FactoryError::Io {
            path: path.to_path_buf(),
            source,
        },
        _ => FactoryError::Dataset {
            path: path.to_path_buf(),
            detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnKind, ColumnSpec};
    use std::io::Write;

    fn test_schema() -> Schema {
        Schema::new(
            "1.0",
            vec![
                ColumnSpec {
                    name: "temperature".to_string(),
                    required: true,
                    kind: ColumnKind::Float {
                        min: None,
                        max: None,
                    },
                },
                ColumnSpec {
                    name: "operator".to_string(),
                    required: false,
                    kind: ColumnKind::Str,
                },
            ],
        )
        .unwrap()
    }

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_rows_aligned_to_schema_order() {
        // Header order differs from schema order.
        let file = write_csv("operator,temperature\ntanaka,20.5\nsuzuki,21.0\n");
        let rows = load_csv(file.path(), &test_schema()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["20.5".to_string(), "tanaka".to_string()]);
        assert_eq!(rows[1], vec!["21.0".to_string(), "suzuki".to_string()]);
    }

    #[test]
    fn test_missing_schema_column_is_an_error() {
        let file = write_csv("operator\ntanaka\n");
        let err = load_csv(file.path(), &test_schema()).unwrap_err();
        assert!(matches!(
            err,
            FactoryError::MissingColumn { column, .. } if column == "temperature"
        ));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let file = write_csv("temperature,operator,shift\n20.5,tanaka,night\n");
        let rows = load_csv(file.path(), &test_schema()).unwrap();
        assert_eq!(rows, vec![vec!["20.5".to_string(), "tanaka".to_string()]]);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_csv(Path::new("/nonexistent/data.csv"), &test_schema()).unwrap_err();
        assert!(matches!(err, FactoryError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/data.csv"));
    }

    #[test]
    fn test_header_only_file_yields_no_rows() {
        let file = write_csv("temperature,operator\n");
        let rows = load_csv(file.path(), &test_schema()).unwrap();
        assert!(rows.is_empty());
    }
}
