//! CLI configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Application configuration, loaded once at startup and passed down
/// explicitly. Sources: an optional config file, then `FML_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path of the schema JSON file
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// File backing the CURRENT model slot
    #[serde(default = "default_current_model_path")]
    pub current_model_path: PathBuf,

    /// Directory holding timestamped archive copies
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Interpreter for the training pipeline
    #[serde(default = "default_trainer_program")]
    pub trainer_program: String,

    /// Leading trainer arguments, before the request flags
    #[serde(default = "default_trainer_args")]
    pub trainer_args: Vec<String>,

    /// Wall-clock bound for interactive prediction runs, in milliseconds
    #[serde(default = "default_predict_timeout_ms")]
    pub predict_timeout_ms: u64,
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config/schema.json")
}

fn default_current_model_path() -> PathBuf {
    PathBuf::from("models/current/model.onnx")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("models/archive")
}

fn default_trainer_program() -> String {
    "python3".to_string()
}

fn default_trainer_args() -> Vec<String> {
    vec!["-m".to_string(), "trainer.main".to_string()]
}

fn default_predict_timeout_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            current_model_path: default_current_model_path(),
            archive_dir: default_archive_dir(),
            trainer_program: default_trainer_program(),
            trainer_args: default_trainer_args(),
            predict_timeout_ms: default_predict_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("FML"))
            .build()
            .context("Failed to assemble configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.predict_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.schema_path, PathBuf::from("config/schema.json"));
        assert_eq!(
            config.current_model_path,
            PathBuf::from("models/current/model.onnx")
        );
        assert_eq!(config.trainer_program, "python3");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"schema_path": "custom/schema.json"}"#)
            .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.schema_path, PathBuf::from("custom/schema.json"));
        assert_eq!(config.archive_dir, PathBuf::from("models/archive"));
    }
}
