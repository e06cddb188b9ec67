//! Feature transformation into model tensor layout
//!
//! A transformer is bound to one schema instance; records that do not match
//! it are a `Shape` error, not a validation issue. Transformation is
//! deterministic: identical records always produce byte-identical tensors,
//! which keeps simulation diffs and audits reproducible.
//!
//! The crate's canonical numeric type is f64. Narrowing to the model's f32
//! happens here, at tensor construction, and nowhere else.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{FactoryError, FactoryResult};
use crate::models::{FieldValue, InputRecord};
use crate::schema::{ColumnKind, Schema};

/// Tensor widths derived from a schema's column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLayout {
    pub numeric_width: usize,
    pub categorical_width: usize,
}

impl TensorLayout {
    pub fn of(schema: &Schema) -> Self {
        Self {
            numeric_width: schema.numeric_width(),
            categorical_width: schema.categorical_width(),
        }
    }
}

/// Feature tensors for one record, ready for the inference engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub numeric: Vec<f32>,
    pub categorical: Vec<String>,
}

/// Row-major feature tensors for a batch of records: each record's numeric
/// columns are contiguous, with a parallel string array grouped the same
/// way.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensors {
    numeric: Vec<f32>,
    categorical: Vec<String>,
    record_count: usize,
    layout: TensorLayout,
}

impl FeatureTensors {
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn numeric(&self) -> &[f32] {
        &self.numeric
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    /// Extract the feature vector of a single record.
    pub fn record(&self, index: usize) -> Option<FeatureVector> {
        if index >= self.record_count {
            return None;
        }
        let nw = self.layout.numeric_width;
        let cw = self.layout.categorical_width;
        Some(FeatureVector {
            numeric: self.numeric[index * nw..(index + 1) * nw].to_vec(),
            categorical: self.categorical[index * cw..(index + 1) * cw].to_vec(),
        })
    }
}

/// Converts typed records into the tensor layout the model expects,
/// preserving schema column order.
pub struct FeatureTransformer {
    schema: Arc<Schema>,
    layout: TensorLayout,
}

impl FeatureTransformer {
    pub fn new(schema: Arc<Schema>) -> Self {
        let layout = TensorLayout::of(&schema);
        Self { schema, layout }
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Transform a batch of records into row-major tensors.
    pub fn to_features(&self, records: &[InputRecord]) -> FactoryResult<FeatureTensors> {
        let mut numeric = Vec::with_capacity(records.len() * self.layout.numeric_width);
        let mut categorical = Vec::with_capacity(records.len() * self.layout.categorical_width);

        for (index, record) in records.iter().enumerate() {
            self.append_record(index, record, &mut numeric, &mut categorical)?;
        }

        Ok(FeatureTensors {
            numeric,
            categorical,
            record_count: records.len(),
            layout: self.layout,
        })
    }

    /// Transform a single record.
    pub fn to_feature_vector(&self, record: &InputRecord) -> FactoryResult<FeatureVector> {
        let mut numeric = Vec::with_capacity(self.layout.numeric_width);
        let mut categorical = Vec::with_capacity(self.layout.categorical_width);
        self.append_record(0, record, &mut numeric, &mut categorical)?;
        Ok(FeatureVector {
            numeric,
            categorical,
        })
    }

    fn append_record(
        &self,
        index: usize,
        record: &InputRecord,
        numeric: &mut Vec<f32>,
        categorical: &mut Vec<String>,
    ) -> FactoryResult<()> {
        for spec in self.schema.columns() {
            let value = record.get(&spec.name).ok_or_else(|| FactoryError::Shape {
                record: index,
                detail: format!("missing column \"{}\"", spec.name),
            })?;
            if spec.kind.is_numeric() {
                numeric.push(numeric_cell(index, &spec.name, value)?);
            } else {
                categorical.push(categorical_cell(index, &spec.name, value)?);
            }
        }
        Ok(())
    }
}

fn numeric_cell(index: usize, column: &str, value: &FieldValue) -> FactoryResult<f32> {
    match value {
        FieldValue::Int(v) => Ok(*v as f32),
        FieldValue::Float(v) => Ok(*v as f32),
        FieldValue::Date(d) => Ok(epoch_days(*d)),
        FieldValue::Missing => Ok(f32::NAN),
        FieldValue::Str(_) => Err(FactoryError::Shape {
            record: index,
            detail: format!("column \"{}\" holds a string but the schema says numeric", column),
        }),
    }
}

fn categorical_cell(index: usize, column: &str, value: &FieldValue) -> FactoryResult<String> {
    match value {
        FieldValue::Str(v) => Ok(v.clone()),
        FieldValue::Missing => Ok(String::new()),
        other => Err(FactoryError::Shape {
            record: index,
            detail: format!(
                "column \"{}\" holds {:?} but the schema says categorical",
                column, other
            ),
        }),
    }
}

/// DATE columns feed the numeric tensor as days since the Unix epoch.
fn epoch_days(date: NaiveDate) -> f32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use std::collections::BTreeSet;

    fn test_schema() -> Arc<Schema> {
        Arc::new(
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
                        name: "product_type".to_string(),
                        required: true,
                        kind: ColumnKind::Category {
                            allowed: BTreeSet::from(["A".to_string(), "B".to_string()]),
                        },
                    },
                    ColumnSpec {
                        name: "batch_count".to_string(),
                        required: true,
                        kind: ColumnKind::Int {
                            min: None,
                            max: None,
                        },
                    },
                    ColumnSpec {
                        name: "produced_on".to_string(),
                        required: true,
                        kind: ColumnKind::Date {
                            format: "%Y-%m-%d".to_string(),
                        },
                    },
                ],
            )
            .unwrap(),
        )
    }

    fn test_record() -> InputRecord {
        let mut record = InputRecord::new();
        record.push("temperature", FieldValue::Float(20.5));
        record.push("product_type", FieldValue::Str("A".to_string()));
        record.push("batch_count", FieldValue::Int(3));
        record.push(
            "produced_on",
            FieldValue::Date(NaiveDate::from_ymd_opt(1970, 1, 11).unwrap()),
        );
        record
    }

    #[test]
    fn test_layout_counts_kinds() {
        let transformer = FeatureTransformer::new(test_schema());
        assert_eq!(
            transformer.layout(),
            TensorLayout {
                numeric_width: 3,
                categorical_width: 1
            }
        );
    }

    #[test]
    fn test_row_major_grouping_preserves_schema_order() {
        let transformer = FeatureTransformer::new(test_schema());
        let mut second = test_record();
        second.set("temperature", FieldValue::Float(25.0)).unwrap();
        second
            .set("product_type", FieldValue::Str("B".to_string()))
            .unwrap();

        let tensors = transformer.to_features(&[test_record(), second]).unwrap();
        assert_eq!(tensors.record_count(), 2);
        // One record's numeric columns are contiguous: temperature,
        // batch_count, produced_on (epoch days).
        assert_eq!(
            tensors.numeric(),
            &[20.5, 3.0, 10.0, 25.0, 3.0, 10.0]
        );
        assert_eq!(tensors.categorical(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let transformer = FeatureTransformer::new(test_schema());
        let records = vec![test_record(), test_record()];
        let first = transformer.to_features(&records).unwrap();
        let second = transformer.to_features(&records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_column_is_shape_error() {
        let transformer = FeatureTransformer::new(test_schema());
        let mut record = InputRecord::new();
        record.push("temperature", FieldValue::Float(20.5));

        let err = transformer.to_features(&[record]).unwrap_err();
        assert!(matches!(err, FactoryError::Shape { record: 0, .. }));
    }

    #[test]
    fn test_wrongly_typed_cell_is_shape_error() {
        let transformer = FeatureTransformer::new(test_schema());
        let mut record = test_record();
        record
            .set("temperature", FieldValue::Str("warm".to_string()))
            .unwrap();

        let err = transformer.to_features(&[record]).unwrap_err();
        assert!(matches!(err, FactoryError::Shape { .. }));
    }

    #[test]
    fn test_missing_optional_values_encoded() {
        let transformer = FeatureTransformer::new(test_schema());
        let mut record = test_record();
        record.set("batch_count", FieldValue::Missing).unwrap();
        record.set("product_type", FieldValue::Missing).unwrap();

        let vector = transformer.to_feature_vector(&record).unwrap();
        assert!(vector.numeric[1].is_nan());
        assert_eq!(vector.categorical, vec![String::new()]);
    }

    #[test]
    fn test_record_extraction_round_trips() {
        let transformer = FeatureTransformer::new(test_schema());
        let tensors = transformer.to_features(&[test_record()]).unwrap();
        let vector = tensors.record(0).unwrap();
        assert_eq!(
            vector,
            transformer.to_feature_vector(&test_record()).unwrap()
        );
        assert!(tensors.record(1).is_none());
    }
}
