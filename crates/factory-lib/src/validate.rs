//! Schema-driven validation of raw CSV rows
//!
//! Validation is pure: same rows and schema always produce the same error
//! list, ordered by row then column. Data-quality problems become
//! `ValidationError` values and never abort the batch; a row with three bad
//! cells yields three errors.

use chrono::NaiveDate;

use crate::error::{FactoryError, FactoryResult};
use crate::models::{FieldValue, InputRecord, ValidationError};
use crate::schema::{ColumnKind, ColumnSpec, Schema};

/// Validate positionally-aligned rows against a schema.
///
/// Rows must already be aligned to `schema.columns()` order (header mapping
/// happens in the dataset loader). An empty row set is itself an error: the
/// system must never silently accept zero rows as valid.
pub fn validate(rows: &[Vec<String>], schema: &Schema) -> Vec<ValidationError> {
    if rows.is_empty() {
        return vec![ValidationError::new("", 0, "no data to validate")];
    }

    let mut errors = Vec::new();
    for (row_index, row) in rows.iter().enumerate() {
        for (col_index, spec) in schema.columns().iter().enumerate() {
            let raw = row.get(col_index).map(String::as_str).unwrap_or("");
            if let Err(message) = check_cell(spec, raw) {
                errors.push(ValidationError::new(spec.name.clone(), row_index, message));
            }
        }
    }

    if !errors.is_empty() {
        tracing::debug!(
            rows = rows.len(),
            errors = errors.len(),
            "Validation found errors"
        );
    }
    errors
}

fn check_cell(spec: &ColumnSpec, raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        if spec.required {
            return Err("required field missing".to_string());
        }
        return Ok(());
    }
    coerce_cell(&spec.kind, raw).map(|_| ())
}

/// Coerce one non-empty cell to its typed value, or explain why it cannot
/// be. Shared by validation and record building so the two can never
/// disagree on what parses.
pub fn coerce_cell(kind: &ColumnKind, raw: &str) -> Result<FieldValue, String> {
    let raw = raw.trim();
    match kind {
        ColumnKind::Str => Ok(FieldValue::Str(raw.to_string())),
        ColumnKind::Int { min, max } => {
            let value: i64 = raw
                .parse()
                .map_err(|_| "invalid numeric value".to_string())?;
            check_range(value as f64, *min, *max)?;
            Ok(FieldValue::Int(value))
        }
        ColumnKind::Float { min, max } => {
            let value: f64 = raw
                .parse()
                .map_err(|_| "invalid numeric value".to_string())?;
            if !value.is_finite() {
                return Err("invalid numeric value".to_string());
            }
            check_range(value, *min, *max)?;
            Ok(FieldValue::Float(value))
        }
        ColumnKind::Date { format } => NaiveDate::parse_from_str(raw, format)
            .map(FieldValue::Date)
            .map_err(|_| format!("invalid date format, expected {}", format)),
        ColumnKind::Category { allowed } => {
            if allowed.contains(raw) {
                Ok(FieldValue::Str(raw.to_string()))
            } else {
                let values: Vec<&str> = allowed.iter().map(String::as_str).collect();
                Err(format!("value not in allowed set {{{}}}", values.join(", ")))
            }
        }
    }
}

fn check_range(value: f64, min: Option<f64>, max: Option<f64>) -> Result<(), String> {
    let below = min.map(|m| value < m).unwrap_or(false);
    let above = max.map(|m| value > m).unwrap_or(false);
    if below || above {
        let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".to_string());
        let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "inf".to_string());
        return Err(format!("value out of range [{},{}]", lo, hi));
    }
    Ok(())
}

/// Build typed records from rows that already validated clean.
///
/// A coercion failure here means the caller skipped validation, so it is
/// reported as a hard `Shape` error rather than a `ValidationError`.
pub fn build_records(rows: &[Vec<String>], schema: &Schema) -> FactoryResult<Vec<InputRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for (row_index, row) in rows.iter().enumerate() {
        let mut record = InputRecord::new();
        for (col_index, spec) in schema.columns().iter().enumerate() {
            let raw = row.get(col_index).map(String::as_str).unwrap_or("");
            let value = if raw.trim().is_empty() {
                if spec.required {
                    return Err(FactoryError::Shape {
                        record: row_index,
                        detail: format!("required column \"{}\" is empty", spec.name),
                    });
                }
                FieldValue::Missing
            } else {
                coerce_cell(&spec.kind, raw).map_err(|message| FactoryError::Shape {
                    record: row_index,
                    detail: format!("column \"{}\": {}", spec.name, message),
                })?
            };
            record.push(spec.name.clone(), value);
        }
        records.push(record);
    }
    Ok(records)
}
