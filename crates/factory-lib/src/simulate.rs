//! What-if simulation over copied input records
//!
//! Applies sparse field overrides to a deep copy of a record and re-runs
//! inference on the copy. The caller's record is never mutated, so a UI can
//! explore counterfactuals repeatedly without corrupting displayed state.
//! Model sessions stay owned by the inference engine; this module only
//! composes the transformer and the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::FactoryResult;
use crate::inference::InferenceEngine;
use crate::models::{FieldValue, InferenceResult, InputRecord};
use crate::transform::FeatureTransformer;

/// Runs counterfactual predictions against the CURRENT model.
pub struct SimulationEngine {
    transformer: FeatureTransformer,
    engine: Arc<InferenceEngine>,
}

impl SimulationEngine {
    pub fn new(transformer: FeatureTransformer, engine: Arc<InferenceEngine>) -> Self {
        Self {
            transformer,
            engine,
        }
    }

    /// Predict on a copy of `original` with `overrides` applied.
    ///
    /// Fails with `UnknownColumn` before touching the model if an override
    /// names a column the record does not have; adding columns silently
    /// would desynchronize the feature layout from the schema.
    pub fn simulate(
        &self,
        original: &InputRecord,
        overrides: &BTreeMap<String, FieldValue>,
    ) -> FactoryResult<InferenceResult> {
        let mut modified = original.clone();
        for (column, value) in overrides {
            modified.set(column, value.clone())?;
        }

        debug!(
            overrides = overrides.len(),
            columns = modified.len(),
            "Running what-if simulation"
        );
        let features = self.transformer.to_feature_vector(&modified)?;
        self.engine.predict(&features, false)
    }
}
