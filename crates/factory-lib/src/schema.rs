//! Declarative column schema for tabular production data
//!
//! Loaded once at startup from a JSON document; a malformed schema file is
//! a fatal error. Column constraints are a closed tagged union so every
//! validation strategy is matched exhaustively at compile time.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{FactoryError, FactoryResult};

/// Default date pattern when a DATE column does not specify one.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Column type together with the constraints relevant to it.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Str,
    Int { min: Option<f64>, max: Option<f64> },
    Float { min: Option<f64>, max: Option<f64> },
    Date { format: String },
    Category { allowed: BTreeSet<String> },
}

impl ColumnKind {
    /// Whether values of this kind feed the numeric tensor. Dates count:
    /// they are encoded as days since the Unix epoch.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnKind::Int { .. } | ColumnKind::Float { .. } | ColumnKind::Date { .. }
        )
    }
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub required: bool,
    pub kind: ColumnKind,
}

/// Ordered column contract for one dataset layout.
///
/// `version` identifies compatibility for models trained against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    version: String,
    columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(version: impl Into<String>, columns: Vec<ColumnSpec>) -> FactoryResult<Self> {
        let schema = Self {
            version: version.into(),
            columns,
        };
        schema
            .check()
            .map_err(|detail| FactoryError::Schema {
                path: "<inline>".into(),
                detail,
            })?;
        Ok(schema)
    }

    /// Load a schema from a JSON file. Any structural problem is fatal.
    pub fn load(path: &Path) -> FactoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| FactoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawSchema = serde_json::from_str(&text).map_err(|e| FactoryError::Schema {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let columns = raw
            .columns
            .into_iter()
            .map(RawColumn::into_spec)
            .collect::<Result<Vec<_>, String>>()
            .map_err(|detail| FactoryError::Schema {
                path: path.to_path_buf(),
                detail,
            })?;
        let schema = Self {
            version: raw.version,
            columns,
        };
        schema.check().map_err(|detail| FactoryError::Schema {
            path: path.to_path_buf(),
            detail,
        })?;
        tracing::info!(
            version = %schema.version,
            columns = schema.columns.len(),
            "Schema loaded"
        );
        Ok(schema)
    }

    fn check(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("schema defines no columns".to_string());
        }
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err("schema contains an unnamed column".to_string());
            }
            if !seen.insert(column.name.as_str()) {
                return Err(format!("duplicate column name \"{}\"", column.name));
            }
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of columns feeding the numeric tensor.
    pub fn numeric_width(&self) -> usize {
        self.columns.iter().filter(|c| c.kind.is_numeric()).count()
    }

    /// Number of columns feeding the categorical tensor.
    pub fn categorical_width(&self) -> usize {
        self.columns.len() - self.numeric_width()
    }
}

/// Wire format of the schema file: `{version, columns: [{name, type,
/// required, format?, allowed_values?, min?, max?}]}`. Constraint fields
/// irrelevant to the declared type are ignored.
#[derive(Debug, Deserialize)]
struct RawSchema {
    version: String,
    columns: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    required: bool,
    format: Option<String>,
    allowed_values: Option<Vec<String>>,
    min: Option<f64>,
    max: Option<f64>,
}

impl RawColumn {
    fn into_spec(self) -> Result<ColumnSpec, String> {
        let kind_name = self.kind.to_ascii_lowercase();
        if matches!(kind_name.as_str(), "int" | "float") {
            if let (Some(lo), Some(hi)) = (self.min, self.max) {
                if lo > hi {
                    return Err(format!(
                        "column \"{}\" has min {} greater than max {}",
                        self.name, lo, hi
                    ));
                }
            }
        }
        let kind = match kind_name.as_str() {
            "string" => ColumnKind::Str,
            "int" => ColumnKind::Int {
                min: self.min,
                max: self.max,
            },
            "float" => ColumnKind::Float {
                min: self.min,
                max: self.max,
            },
            "date" => ColumnKind::Date {
                format: self
                    .format
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            },
            "category" => {
                let allowed: BTreeSet<String> =
                    self.allowed_values.unwrap_or_default().into_iter().collect();
                if allowed.is_empty() {
                    return Err(format!(
                        "category column \"{}\" has no allowed_values",
                        self.name
                    ));
                }
                ColumnKind::Category { allowed }
            }
            other => {
                return Err(format!(
                    "column \"{}\" has unknown type \"{}\"",
                    self.name, other
                ))
            }
        };
        Ok(ColumnSpec {
            name: self.name,
            required: self.required,
            kind,
        })
    }
}
