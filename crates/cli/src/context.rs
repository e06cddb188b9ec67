//! Shared startup context for CLI commands

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use factory_lib::dataset;
use factory_lib::inference::InferenceEngine;
use factory_lib::lifecycle::ModelLifecycleManager;
use factory_lib::trainer::{TrainerConfig, TrainingRunner};
use factory_lib::transform::{FeatureTransformer, TensorLayout};
use factory_lib::validate;
use factory_lib::{InputRecord, Schema, ValidationError};

use crate::config::AppConfig;

/// Configuration plus the loaded schema. Built once per invocation; a
/// malformed schema file aborts startup.
pub struct AppContext {
    pub config: AppConfig,
    pub schema: Arc<Schema>,
}

impl AppContext {
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config = AppConfig::load(config_file)?;
        let schema = Schema::load(&config.schema_path)
            .with_context(|| format!("Cannot start without schema {}", config.schema_path.display()))?;
        Ok(Self {
            config,
            schema: Arc::new(schema),
        })
    }

    pub fn transformer(&self) -> FeatureTransformer {
        FeatureTransformer::new(self.schema.clone())
    }

    /// Load the CURRENT model into an engine. Fails fast when the
    /// configured model cannot be served.
    pub fn engine(&self) -> Result<Arc<InferenceEngine>> {
        let layout = TensorLayout::of(&self.schema);
        let engine = InferenceEngine::new(&self.config.current_model_path, layout)
            .context("Cannot start without a loadable current model")?;
        Ok(Arc::new(engine))
    }

    pub fn lifecycle(&self, engine: Arc<InferenceEngine>) -> ModelLifecycleManager {
        ModelLifecycleManager::new(
            self.config.current_model_path.clone(),
            self.config.archive_dir.clone(),
            engine,
        )
    }

    pub fn training_runner(&self, timeout_secs: Option<u64>) -> TrainingRunner {
        TrainingRunner::new(TrainerConfig {
            program: self.config.trainer_program.clone(),
            args: self.config.trainer_args.clone(),
            timeout: timeout_secs.map(std::time::Duration::from_secs),
        })
    }

    /// Load a CSV and validate it against the schema.
    pub fn load_and_validate(&self, data: &Path) -> Result<(Vec<Vec<String>>, Vec<ValidationError>)> {
        let rows = dataset::load_csv(data, &self.schema)?;
        let errors = validate::validate(&rows, &self.schema);
        Ok((rows, errors))
    }

    /// Build typed records from rows that validated clean.
    pub fn records(&self, rows: &[Vec<String>]) -> Result<Vec<InputRecord>> {
        Ok(validate::build_records(rows, &self.schema)?)
    }
}
