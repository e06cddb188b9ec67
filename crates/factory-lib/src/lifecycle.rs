//! Model lifecycle management
//!
//! Owns the filesystem locations of the CURRENT model and the archive of
//! prior versions. Every operation leaves the system serving its
//! last-known-good model on any failure: validation uses a throwaway
//! session, archiving is additive, and a switch installs the new file and
//! builds its session fully before the live reference moves.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{FactoryError, FactoryResult};
use crate::inference::{InferenceEngine, ModelSlot};
use crate::models::{ArchiveEntry, ModelRole};
use crate::transform::TensorLayout;

/// One problem found while validating a model file. Distinct from
/// `ValidationError`, which only the data validator produces.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModelIssue {
    pub path: PathBuf,
    pub message: String,
}

/// Manages the CURRENT model file, the archive directory, and promotion of
/// new model versions into the serving engine.
pub struct ModelLifecycleManager {
    current_path: PathBuf,
    archive_dir: PathBuf,
    layout: TensorLayout,
    engine: Arc<InferenceEngine>,
}

impl ModelLifecycleManager {
    pub fn new(
        current_path: PathBuf,
        archive_dir: PathBuf,
        engine: Arc<InferenceEngine>,
    ) -> Self {
        let layout = engine.layout();
        Self {
            current_path,
            archive_dir,
            layout,
            engine,
        }
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Validate a model file by loading it into a throwaway session.
    ///
    /// Returns an empty list when the file is servable. Never touches the
    /// live CURRENT session.
    pub fn validate_model(&self, path: &Path) -> Vec<ModelIssue> {
        match InferenceEngine::load_plan(path, &self.layout) {
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Model validation failed");
                vec![ModelIssue {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }]
            }
        }
    }

    /// Copy the current model into the archive directory with a timestamp
    /// suffix (`{name}_{YYYYMMDD_HHMMSS}.onnx`). Archiving is additive: the
    /// source file is never removed.
    pub fn archive_model(&self, name: &str) -> FactoryResult<ArchiveEntry> {
        let bytes = fs::read(&self.current_path).map_err(|source| FactoryError::Io {
            path: self.current_path.clone(),
            source,
        })?;
        fs::create_dir_all(&self.archive_dir).map_err(|source| FactoryError::Io {
            path: self.archive_dir.clone(),
            source,
        })?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let archived_path = self.archive_dir.join(format!("{}_{}.onnx", name, timestamp));
        write_atomically(&archived_path, &bytes)?;

        let entry = ArchiveEntry {
            original_path: self.current_path.clone(),
            archived_path: archived_path.clone(),
            checksum: sha256_hex(&bytes),
            archived_at: chrono::Utc::now().timestamp(),
        };
        info!(
            event = "model_archived",
            source = %self.current_path.display(),
            archived = %archived_path.display(),
            checksum = %entry.checksum,
            "Model archived"
        );
        Ok(entry)
    }

    /// Promote a new model file to CURRENT.
    ///
    /// The replacement session is built first; then the file is installed
    /// over the current path via temp-file + rename and its checksum
    /// verified; only then does the live reference swap. A failure at any
    /// step leaves the old model fully active.
    pub fn switch_model(&self, new_path: &Path) -> FactoryResult<()> {
        let plan = InferenceEngine::load_plan(new_path, &self.layout)?;

        let bytes = fs::read(new_path).map_err(|source| FactoryError::Io {
            path: new_path.to_path_buf(),
            source,
        })?;
        let expected = sha256_hex(&bytes);

        if let Some(parent) = self.current_path.parent() {
            fs::create_dir_all(parent).map_err(|source| FactoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_atomically(&self.current_path, &bytes)?;

        let installed = fs::read(&self.current_path).map_err(|source| FactoryError::Io {
            path: self.current_path.clone(),
            source,
        })?;
        let actual = sha256_hex(&installed);
        if actual != expected {
            return Err(FactoryError::ModelLoad {
                path: self.current_path.clone(),
                detail: format!(
                    "checksum mismatch after install: expected {}, got {}",
                    expected, actual
                ),
            });
        }

        self.engine.install_current(ModelSlot::new(
            self.current_path.clone(),
            ModelRole::Current,
            plan,
        ))?;

        info!(
            event = "model_switched",
            source = %new_path.display(),
            current = %self.current_path.display(),
            checksum = %expected,
            "Model switched"
        );
        Ok(())
    }

    /// List archived model copies, newest first by file name.
    pub fn list_archive(&self) -> FactoryResult<Vec<PathBuf>> {
        if !self.archive_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.archive_dir).map_err(|source| FactoryError::Io {
            path: self.archive_dir.clone(),
            source,
        })?;
        for entry in dir {
            let entry = entry.map_err(|source| FactoryError::Io {
                path: self.archive_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().map(|e| e == "onnx").unwrap_or(false) {
                entries.push(path);
            }
        }
        entries.sort();
        entries.reverse();
        Ok(entries)
    }
}

/// Write to a temp file in the destination directory, then rename into
/// place so the destination is never observed half-written.
fn write_atomically(path: &Path, bytes: &[u8]) -> FactoryResult<()> {
    let temp_path = path.with_extension("tmp");
    let io_err = |source| FactoryError::Io {
        path: temp_path.clone(),
        source,
    };

    let mut file = File::create(&temp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|source| FactoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_with_dirs() -> (TempDir, ModelLifecycleManager) {
        let dir = TempDir::new().unwrap();
        let current = dir.path().join("current").join("model.onnx");
        fs::create_dir_all(current.parent().unwrap()).unwrap();
        fs::write(&current, b"model bytes v1").unwrap();

        let layout = TensorLayout {
            numeric_width: 2,
            categorical_width: 1,
        };
        let engine = Arc::new(InferenceEngine::detached(layout));
        let manager =
            ModelLifecycleManager::new(current, dir.path().join("archive"), engine);
        (dir, manager)
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        let a = sha256_hex(b"model bytes");
        let b = sha256_hex(b"model bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_archive_is_additive() {
        let (_dir, manager) = manager_with_dirs();
        let entry = manager.archive_model("v1").unwrap();

        // Source survives, archive holds a timestamped copy with the same bytes.
        assert!(manager.current_path().exists());
        assert!(entry.archived_path.exists());
        let name = entry
            .archived_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.starts_with("v1_"));
        assert!(name.ends_with(".onnx"));
        assert_eq!(
            fs::read(&entry.archived_path).unwrap(),
            fs::read(manager.current_path()).unwrap()
        );
        assert_eq!(entry.checksum, sha256_hex(b"model bytes v1"));
    }

    #[test]
    fn test_archive_missing_source_reports_path() {
        let (_dir, manager) = manager_with_dirs();
        fs::remove_file(manager.current_path()).unwrap();

        let err = manager.archive_model("v1").unwrap_err();
        assert!(matches!(err, FactoryError::Io { .. }));
        assert!(err.to_string().contains("model.onnx"));
    }

    #[test]
    fn test_validate_model_missing_file() {
        let (dir, manager) = manager_with_dirs();
        let issues = manager.validate_model(&dir.path().join("nope.onnx"));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("not found"));
    }

    #[test]
    fn test_validate_model_corrupt_file_is_side_effect_free() {
        let (dir, manager) = manager_with_dirs();
        let corrupt = dir.path().join("corrupt.onnx");
        fs::write(&corrupt, b"definitely not onnx").unwrap();

        let before = fs::read(manager.current_path()).unwrap();
        let issues = manager.validate_model(&corrupt);
        assert_eq!(issues.len(), 1);
        // The serving file is untouched by a failed validation.
        assert_eq!(fs::read(manager.current_path()).unwrap(), before);
    }

    #[test]
    fn test_switch_rejects_unloadable_model_and_keeps_current() {
        let (dir, manager) = manager_with_dirs();
        let corrupt = dir.path().join("corrupt.onnx");
        fs::write(&corrupt, b"definitely not onnx").unwrap();

        let err = manager.switch_model(&corrupt).unwrap_err();
        assert!(matches!(err, FactoryError::ModelLoad { .. }));
        assert_eq!(
            fs::read(manager.current_path()).unwrap(),
            b"model bytes v1"
        );
    }

    #[test]
    fn test_list_archive_empty_when_missing() {
        let (_dir, manager) = manager_with_dirs();
        assert!(manager.list_archive().unwrap().is_empty());
    }

    #[test]
    fn test_list_archive_newest_first() {
        let (_dir, manager) = manager_with_dirs();
        fs::create_dir_all(manager.archive_dir()).unwrap();
        fs::write(manager.archive_dir().join("m_20240101_000000.onnx"), b"a").unwrap();
        fs::write(manager.archive_dir().join("m_20240301_000000.onnx"), b"b").unwrap();
        fs::write(manager.archive_dir().join("notes.txt"), b"skip me").unwrap();

        let listed = manager.list_archive().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("20240301"));
    }

    #[test]
    fn test_write_atomically_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("model.onnx");
        write_atomically(&target, b"first").unwrap();
        write_atomically(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert!(!target.with_extension("tmp").exists());
    }
}
