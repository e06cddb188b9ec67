//! Core library for the factory offline ML system
//!
//! This crate provides the core functionality for:
//! - Schema-driven validation of CSV production data
//! - Feature transformation into model tensor layout
//! - ONNX model lifecycle management (archive, validate, atomic switch)
//! - Inference with shadow testing of candidate models
//! - What-if simulation on copied input records
//! - Invocation of the external training pipeline

pub mod dataset;
pub mod error;
pub mod inference;
pub mod lifecycle;
pub mod models;
pub mod schema;
pub mod simulate;
pub mod trainer;
pub mod transform;
pub mod validate;

pub use error::{FactoryError, FactoryResult};
pub use models::*;
pub use schema::{ColumnKind, ColumnSpec, Schema};
