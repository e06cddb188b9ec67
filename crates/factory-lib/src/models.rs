//! Core data models for the factory ML system

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{FactoryError, FactoryResult};

/// Typed value of one cell after coercion against the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    /// An optional column whose cell was empty. Encoded as NaN in the
    /// numeric tensor and as the empty string in the categorical tensor.
    Missing,
}

/// A single typed input record, insertion-ordered to match schema column
/// order. Order matters: it determines the tensor layout fed to the model.
///
/// Cloning produces a deep copy; simulation works on the clone so the
/// caller's record survives untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputRecord {
    fields: Vec<(String, FieldValue)>,
}

impl InputRecord {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a column value, preserving insertion order.
    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Overwrite an existing column value. Fails if the column is absent so
    /// a typo cannot silently desynchronize the record from the schema.
    pub fn set(&mut self, name: &str, value: FieldValue) -> FactoryResult<()> {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                *v = value;
                Ok(())
            }
            None => Err(FactoryError::UnknownColumn {
                column: name.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// One validation failure, located by row and column.
///
/// Produced only by the validator; an empty list means the input passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Name of the offending column. Empty for dataset-level errors.
    pub column: String,
    /// 0-based row index.
    pub row: usize,
    /// Human-readable description of the failure.
    pub message: String,
}

impl ValidationError {
    pub fn new(column: impl Into<String>, row: usize, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            row,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.column.is_empty() {
            write!(f, "row {}: {}", self.row, self.message)
        } else {
            write!(f, "row {}, column {}: {}", self.row, self.column, self.message)
        }
    }
}

/// Which model slot served a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Current,
    Candidate,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRole::Current => write!(f, "current"),
            ModelRole::Candidate => write!(f, "candidate"),
        }
    }
}

/// Result of one model prediction.
///
/// Probabilities are passed through from the model unmodified; the engine
/// does not normalize them.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub label: String,
    pub probabilities: Vec<f64>,
    pub model_role: ModelRole,
    pub generated_at: i64,
}

/// Record of one archived model copy. Archiving is additive: the source
/// file is never removed.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub original_path: std::path::PathBuf,
    pub archived_path: std::path::PathBuf,
    /// SHA256 of the archived bytes.
    pub checksum: String,
    pub archived_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_preserves_insertion_order() {
        let mut record = InputRecord::new();
        record.push("temperature", FieldValue::Float(20.0));
        record.push("pressure", FieldValue::Float(101.3));
        record.push("product_type", FieldValue::Str("A".to_string()));

        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["temperature", "pressure", "product_type"]);
    }

    #[test]
    fn test_record_set_unknown_column_fails() {
        let mut record = InputRecord::new();
        record.push("temperature", FieldValue::Float(20.0));

        let err = record.set("temprature", FieldValue::Float(25.0)).unwrap_err();
        assert!(matches!(
            err,
            crate::FactoryError::UnknownColumn { column } if column == "temprature"
        ));
    }

    #[test]
    fn test_record_clone_is_deep() {
        let mut original = InputRecord::new();
        original.push("temperature", FieldValue::Float(20.0));

        let mut copy = original.clone();
        copy.set("temperature", FieldValue::Float(90.0)).unwrap();

        assert_eq!(original.get("temperature"), Some(&FieldValue::Float(20.0)));
        assert_eq!(copy.get("temperature"), Some(&FieldValue::Float(90.0)));
    }
}
