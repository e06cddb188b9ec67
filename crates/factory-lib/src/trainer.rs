//! External training pipeline invocation
//!
//! The training pipeline is a separate process; communication is pure
//! message passing: spawn with CLI flags, stream stdout/stderr into the
//! log, consume the exit code. Structured output is never parsed. Jobs are
//! cancellable by explicitly terminating the child; a dropped handle does
//! not kill a still-running job.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{FactoryError, FactoryResult};

/// How many trailing stderr lines are kept for failure reporting.
const STDERR_TAIL_LINES: usize = 50;

/// Arguments for one training run, mirroring the trainer's CLI contract:
/// `--data`, `--output`, `--config`, `--report`.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub data_path: PathBuf,
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
    pub report: bool,
}

/// How to start the trainer process.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Interpreter or executable, e.g. `python3`.
    pub program: String,
    /// Leading arguments before the request flags, e.g. `["-m", "trainer.main"]`.
    pub args: Vec<String>,
    /// Wall-clock bound for `wait`; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "trainer.main".to_string()],
            timeout: None,
        }
    }
}

/// Outcome of a completed training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub exit_code: i32,
    pub duration: Duration,
}

/// Spawns and supervises training subprocesses.
pub struct TrainingRunner {
    config: TrainerConfig,
}

impl TrainingRunner {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Start a training run. Log streaming begins immediately; call
    /// `TrainingJob::wait` for completion or `cancel` to terminate.
    pub async fn spawn(&self, request: &TrainingRequest) -> FactoryResult<TrainingJob> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg("--data")
            .arg(&request.data_path)
            .arg("--output")
            .arg(&request.output_dir)
            .arg("--config")
            .arg(&request.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if request.report {
            command.arg("--report");
        }

        let mut child = command.spawn().map_err(|e| FactoryError::Training {
            detail: format!("failed to start {}: {}", self.config.program, e),
        })?;

        info!(
            event = "training_started",
            program = %self.config.program,
            data = %request.data_path.display(),
            output = %request.output_dir.display(),
            report = request.report,
            "Training process started"
        );

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(stream = "stdout", "{}", line);
                }
            })
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail: Vec<String> = Vec::new();
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(stream = "stderr", "{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
                tail
            })
        });

        Ok(TrainingJob {
            child,
            started: Instant::now(),
            timeout: self.config.timeout,
            stdout_task,
            stderr_task,
        })
    }
}

/// A running training process.
#[derive(Debug)]
pub struct TrainingJob {
    child: Child,
    started: Instant,
    timeout: Option<Duration>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<Vec<String>>>,
}

impl TrainingJob {
    /// Wait for the child to exit. Exit code 0 is success; anything else
    /// fails with the last line the child wrote to stderr. A configured
    /// timeout kills the child on expiry.
    pub async fn wait(&mut self) -> FactoryResult<TrainingSummary> {
        let status = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        timeout_secs = timeout.as_secs(),
                        "Training timed out, killing child"
                    );
                    let _ = self.child.start_kill();
                    let _ = self.child.wait().await;
                    return Err(FactoryError::Training {
                        detail: format!("timed out after {}s", timeout.as_secs()),
                    });
                }
            },
            None => self.child.wait().await,
        };
        let status = status.map_err(|e| FactoryError::Training {
            detail: format!("failed to wait for child: {}", e),
        })?;

        let duration = self.started.elapsed();
        let stderr_tail = self.drain_logs().await;

        // Process killed by a signal reports no code.
        let exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(FactoryError::TrainingFailed {
                exit_code,
                stderr: stderr_tail
                    .last()
                    .cloned()
                    .unwrap_or_else(|| "no stderr output".to_string()),
            });
        }

        info!(
            event = "training_finished",
            exit_code,
            duration_secs = duration.as_secs_f64(),
            "Training process finished"
        );
        Ok(TrainingSummary {
            exit_code,
            duration,
        })
    }

    /// Explicitly terminate the child process. This is the only way a job
    /// is ever killed; dropping the handle leaves the child running.
    pub async fn cancel(&mut self) -> FactoryResult<()> {
        self.child.start_kill().map_err(|e| FactoryError::Training {
            detail: format!("failed to kill child: {}", e),
        })?;
        let _ = self.child.wait().await;
        self.drain_logs().await;
        info!(event = "training_cancelled", "Training process cancelled");
        Ok(())
    }

    async fn drain_logs(&mut self) -> Vec<String> {
        if let Some(task) = self.stdout_task.take() {
            let _ = task.await;
        }
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_runner(script: &str, timeout: Option<Duration>) -> (TrainingRunner, TrainingRequest) {
        let runner = TrainingRunner::new(TrainerConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            timeout,
        });
        let request = TrainingRequest {
            data_path: PathBuf::from("data.csv"),
            output_dir: PathBuf::from("out"),
            config_path: PathBuf::from("config.json"),
            report: false,
        };
        (runner, request)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (runner, request) = shell_runner("echo training; exit 0", None);
        let mut job = runner.spawn(&request).await.unwrap();
        let summary = job.wait().await.unwrap();
        assert_eq!(summary.exit_code, 0);
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_line() {
        let (runner, request) = shell_runner("echo boom >&2; exit 3", None);
        let mut job = runner.spawn(&request).await.unwrap();
        let err = job.wait().await.unwrap_err();
        match err {
            FactoryError::TrainingFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let runner = TrainingRunner::new(TrainerConfig {
            program: "definitely-not-a-real-binary".to_string(),
            args: vec![],
            timeout: None,
        });
        let request = TrainingRequest {
            data_path: PathBuf::from("data.csv"),
            output_dir: PathBuf::from("out"),
            config_path: PathBuf::from("config.json"),
            report: false,
        };
        let err = runner.spawn(&request).await.unwrap_err();
        assert!(matches!(err, FactoryError::Training { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let (runner, request) = shell_runner("sleep 30", Some(Duration::from_millis(200)));
        let mut job = runner.spawn(&request).await.unwrap();
        let err = job.wait().await.unwrap_err();
        assert!(matches!(err, FactoryError::Training { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_terminates_running_child() {
        let (runner, request) = shell_runner("sleep 30", None);
        let mut job = runner.spawn(&request).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        job.cancel().await.unwrap();
    }
}
