//! ONNX inference engine with shadow-testing support
//!
//! Wraps tract-onnx sessions for the CURRENT model and an optional
//! CANDIDATE loaded alongside it. The engine exclusively owns both
//! sessions; no other component ever touches a session handle.
//!
//! Swap safety: `predict` holds a slot's read lock for its full duration,
//! and a replacement plan is always built before the write lock is taken,
//! so an in-flight predict completes against the session it started with
//! and no request ever observes a half-loaded model.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{FactoryError, FactoryResult};
use crate::models::{InferenceResult, ModelRole};
use crate::transform::{FeatureVector, TensorLayout};

/// Inference latency above this is logged as slow.
const SLOW_INFERENCE_MS: u128 = 250;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded model session together with where it came from.
#[derive(Debug)]
pub struct ModelSlot {
    path: PathBuf,
    role: ModelRole,
    plan: TractPlan,
    loaded_at: i64,
}

impl ModelSlot {
    pub(crate) fn new(path: PathBuf, role: ModelRole, plan: TractPlan) -> Self {
        Self {
            path,
            role,
            plan,
            loaded_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn loaded_at(&self) -> i64 {
        self.loaded_at
    }
}

/// Inference statistics counters.
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

/// Dual-slot inference engine over tract-onnx sessions.
#[derive(Debug)]
pub struct InferenceEngine {
    layout: TensorLayout,
    current: RwLock<Option<ModelSlot>>,
    candidate: RwLock<Option<ModelSlot>>,
    closed: AtomicBool,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl InferenceEngine {
    /// Load the current model and build an engine around it. Fails fast:
    /// the system never starts without a loadable CURRENT model.
    pub fn new(model_path: &Path, layout: TensorLayout) -> FactoryResult<Self> {
        let plan = Self::load_plan(model_path, &layout)?;
        info!(
            path = %model_path.display(),
            numeric_width = layout.numeric_width,
            categorical_width = layout.categorical_width,
            "Inference engine started"
        );
        Ok(Self {
            layout,
            current: RwLock::new(Some(ModelSlot::new(
                model_path.to_path_buf(),
                ModelRole::Current,
                plan,
            ))),
            candidate: RwLock::new(None),
            closed: AtomicBool::new(false),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    /// Load and optimize an ONNX model for the given tensor layout.
    ///
    /// Also serves as throwaway-session validation: a file this function
    /// accepts is a file the engine can serve.
    pub(crate) fn load_plan(path: &Path, layout: &TensorLayout) -> FactoryResult<TractPlan> {
        if !path.is_file() {
            return Err(FactoryError::ModelLoad {
                path: path.to_path_buf(),
                detail: "model file not found".to_string(),
            });
        }
        let load = || -> TractResult<TractPlan> {
            let mut model = tract_onnx::onnx()
                .model_for_path(path)?
                .with_input_fact(0, f32::fact([1, layout.numeric_width]).into())?;
            if layout.categorical_width > 0 {
                model = model
                    .with_input_fact(1, String::fact([1, layout.categorical_width]).into())?;
            }
            model.into_optimized()?.into_runnable()
        };
        load().map_err(|e| FactoryError::ModelLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Run one prediction against the CURRENT or CANDIDATE session.
    pub fn predict(
        &self,
        features: &FeatureVector,
        use_candidate: bool,
    ) -> FactoryResult<InferenceResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FactoryError::EngineClosed);
        }
        if features.numeric.len() != self.layout.numeric_width
            || features.categorical.len() != self.layout.categorical_width
        {
            return Err(FactoryError::Shape {
                record: 0,
                detail: format!(
                    "feature vector is {}x{} but the engine expects {}x{}",
                    features.numeric.len(),
                    features.categorical.len(),
                    self.layout.numeric_width,
                    self.layout.categorical_width
                ),
            });
        }

        let start = Instant::now();
        let slot_lock = if use_candidate {
            &self.candidate
        } else {
            &self.current
        };
        let guard = slot_lock
            .read()
            .map_err(|e| FactoryError::Internal(format!("slot lock poisoned: {}", e)))?;
        let slot = match guard.as_ref() {
            Some(slot) => slot,
            None if use_candidate => return Err(FactoryError::NoCandidate),
            None => return Err(FactoryError::EngineClosed),
        };

        let outputs = self.run_session(slot, features)?;
        let result = interpret_outputs(&outputs, slot.role())?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                role = %slot.role(),
                "Inference exceeded {}ms target",
                SLOW_INFERENCE_MS
            );
        } else {
            debug!(
                elapsed_us = elapsed.as_micros() as u64,
                role = %slot.role(),
                label = %result.label,
                "Inference completed"
            );
        }
        Ok(result)
    }

    fn run_session(
        &self,
        slot: &ModelSlot,
        features: &FeatureVector,
    ) -> FactoryResult<TVec<TValue>> {
        let numeric = tract_ndarray::Array2::from_shape_vec(
            (1, self.layout.numeric_width),
            features.numeric.clone(),
        )
        .map_err(|e| FactoryError::Shape {
            record: 0,
            detail: e.to_string(),
        })?;

        let mut inputs: TVec<TValue> = tvec!(Tensor::from(numeric).into());
        if self.layout.categorical_width > 0 {
            let categorical = tract_ndarray::Array2::from_shape_vec(
                (1, self.layout.categorical_width),
                features.categorical.clone(),
            )
            .map_err(|e| FactoryError::Shape {
                record: 0,
                detail: e.to_string(),
            })?;
            inputs.push(Tensor::from(categorical).into());
        }

        slot.plan
            .run(inputs)
            .map_err(|e| FactoryError::ModelOutput {
                detail: e.to_string(),
            })
    }

    /// Load a second, independent session for shadow testing. The CURRENT
    /// session is not touched; a previous candidate is replaced.
    pub fn set_candidate(&self, path: &Path) -> FactoryResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FactoryError::EngineClosed);
        }
        let plan = Self::load_plan(path, &self.layout)?;
        let slot = ModelSlot::new(path.to_path_buf(), ModelRole::Candidate, plan);
        let mut guard = self
            .candidate
            .write()
            .map_err(|e| FactoryError::Internal(format!("slot lock poisoned: {}", e)))?;
        let replaced = guard.replace(slot).is_some();
        info!(path = %path.display(), replaced, "Candidate model loaded");
        Ok(())
    }

    /// Drop the candidate session, if any.
    pub fn clear_candidate(&self) {
        if let Ok(mut guard) = self.candidate.write() {
            if guard.take().is_some() {
                info!("Candidate model unloaded");
            }
        }
    }

    pub fn has_candidate(&self) -> bool {
        self.candidate
            .read()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    /// Path of the file backing the CURRENT session.
    pub fn current_model_path(&self) -> Option<PathBuf> {
        self.current
            .read()
            .ok()
            .and_then(|g| g.as_ref().map(|s| s.path.clone()))
    }

    /// Install an already-built slot as CURRENT. The write lock is taken
    /// only after the plan is fully loaded, so readers either see the old
    /// session or the new one, never an intermediate state.
    pub(crate) fn install_current(&self, slot: ModelSlot) -> FactoryResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FactoryError::EngineClosed);
        }
        let mut guard = self
            .current
            .write()
            .map_err(|e| FactoryError::Internal(format!("slot lock poisoned: {}", e)))?;
        let old = guard.replace(slot);
        drop(guard);
        if let Some(old) = old {
            debug!(path = %old.path.display(), "Previous session released");
        }
        Ok(())
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }

    /// Release both sessions. Safe to call with no candidate loaded, and
    /// idempotent: a second close is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.current.write() {
            guard.take();
        }
        if let Ok(mut guard) = self.candidate.write() {
            guard.take();
        }
        info!("Inference engine closed");
    }

    /// An engine with no live sessions, for exercising error paths.
    #[cfg(test)]
    pub(crate) fn detached(layout: TensorLayout) -> Self {
        Self {
            layout,
            current: RwLock::new(None),
            candidate: RwLock::new(None),
            closed: AtomicBool::new(false),
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }
}

/// Map raw session outputs to an `InferenceResult`.
///
/// Classifier exports differ in output typing: the label arrives as a
/// string tensor or an int64 class id, probabilities as f32 or f64. All of
/// them are canonicalized here, the only conversion boundary; probabilities
/// are passed through unmodified beyond widening.
fn interpret_outputs(outputs: &TVec<TValue>, role: ModelRole) -> FactoryResult<InferenceResult> {
    let mut label: Option<String> = None;
    let mut probabilities: Option<Vec<f64>> = None;

    for output in outputs.iter() {
        match output.datum_type() {
            DatumType::String => {
                if label.is_none() {
                    label = output
                        .to_array_view::<String>()
                        .ok()
                        .and_then(|view| view.iter().next().cloned());
                }
            }
            DatumType::I64 => {
                if label.is_none() {
                    label = output
                        .to_array_view::<i64>()
                        .ok()
                        .and_then(|view| view.iter().next().map(|v| v.to_string()));
                }
            }
            DatumType::F32 => {
                if probabilities.is_none() {
                    probabilities = output
                        .to_array_view::<f32>()
                        .ok()
                        .map(|view| view.iter().map(|&p| f64::from(p)).collect());
                }
            }
            DatumType::F64 => {
                if probabilities.is_none() {
                    probabilities = output
                        .to_array_view::<f64>()
                        .ok()
                        .map(|view| view.iter().copied().collect());
                }
            }
            _ => {}
        }
    }

    let probabilities = probabilities.ok_or_else(|| FactoryError::ModelOutput {
        detail: "model produced no probability tensor".to_string(),
    })?;
    // A probabilities-only model still yields a usable label via argmax.
    let label = match label {
        Some(label) => label,
        None => argmax_label(&probabilities)?,
    };

    Ok(InferenceResult {
        label,
        probabilities,
        model_role: role,
        generated_at: chrono::Utc::now().timestamp(),
    })
}

fn argmax_label(probabilities: &[f64]) -> FactoryResult<String> {
    probabilities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i.to_string())
        .ok_or_else(|| FactoryError::ModelOutput {
            detail: "model produced an empty probability tensor".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TensorLayout {
        TensorLayout {
            numeric_width: 2,
            categorical_width: 1,
        }
    }

    fn features() -> FeatureVector {
        FeatureVector {
            numeric: vec![1.0, 2.0],
            categorical: vec!["A".to_string()],
        }
    }

    #[test]
    fn test_missing_model_file_fails_fast() {
        let err = InferenceEngine::new(Path::new("/nonexistent/model.onnx"), layout()).unwrap_err();
        assert!(matches!(err, FactoryError::ModelLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/model.onnx"));
    }

    #[test]
    fn test_candidate_requested_without_candidate() {
        let engine = InferenceEngine::detached(layout());
        let err = engine.predict(&features(), true).unwrap_err();
        assert!(matches!(err, FactoryError::NoCandidate));
    }

    #[test]
    fn test_predict_after_close_fails() {
        let engine = InferenceEngine::detached(layout());
        engine.close();
        let err = engine.predict(&features(), false).unwrap_err();
        assert!(matches!(err, FactoryError::EngineClosed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = InferenceEngine::detached(layout());
        engine.close();
        engine.close();
        assert!(!engine.has_candidate());
    }

    #[test]
    fn test_wrong_feature_width_is_shape_error() {
        let engine = InferenceEngine::detached(layout());
        let bad = FeatureVector {
            numeric: vec![1.0],
            categorical: vec!["A".to_string()],
        };
        let err = engine.predict(&bad, false).unwrap_err();
        assert!(matches!(err, FactoryError::Shape { .. }));
    }

    #[test]
    fn test_interpret_string_label_and_f32_probabilities() {
        let label = Tensor::from(tract_ndarray::arr1(&["OK".to_string()]));
        let probs = Tensor::from(tract_ndarray::arr2(&[[0.9f32, 0.1f32]]));
        let outputs: TVec<TValue> = tvec!(label.into(), probs.into());

        let result = interpret_outputs(&outputs, ModelRole::Current).unwrap();
        assert_eq!(result.label, "OK");
        assert_eq!(result.probabilities, vec![0.9f32 as f64, 0.1f32 as f64]);
        assert_eq!(result.model_role, ModelRole::Current);
    }

    #[test]
    fn test_interpret_int_label() {
        let label = Tensor::from(tract_ndarray::arr1(&[2i64]));
        let probs = Tensor::from(tract_ndarray::arr2(&[[0.1f64, 0.2f64, 0.7f64]]));
        let outputs: TVec<TValue> = tvec!(label.into(), probs.into());

        let result = interpret_outputs(&outputs, ModelRole::Candidate).unwrap();
        assert_eq!(result.label, "2");
        assert_eq!(result.probabilities, vec![0.1, 0.2, 0.7]);
    }

    #[test]
    fn test_interpret_probabilities_only_uses_argmax() {
        let probs = Tensor::from(tract_ndarray::arr2(&[[0.2f32, 0.5f32, 0.3f32]]));
        let outputs: TVec<TValue> = tvec!(probs.into());

        let result = interpret_outputs(&outputs, ModelRole::Current).unwrap();
        assert_eq!(result.label, "1");
    }

    #[test]
    fn test_interpret_no_probabilities_is_an_error() {
        let label = Tensor::from(tract_ndarray::arr1(&["OK".to_string()]));
        let outputs: TVec<TValue> = tvec!(label.into());

        let err = interpret_outputs(&outputs, ModelRole::Current).unwrap_err();
        assert!(matches!(err, FactoryError::ModelOutput { .. }));
    }

    #[test]
    fn test_probabilities_passed_through_unnormalized() {
        // Non-normalized output is a model-quality issue, not an engine
        // bug; values must come through untouched.
        let probs = Tensor::from(tract_ndarray::arr2(&[[2.0f64, 3.0f64]]));
        let outputs: TVec<TValue> = tvec!(probs.into());

        let result = interpret_outputs(&outputs, ModelRole::Current).unwrap();
        assert_eq!(result.probabilities, vec![2.0, 3.0]);
    }
}
