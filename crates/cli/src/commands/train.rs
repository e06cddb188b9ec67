//! Training pipeline command

use std::path::Path;

use anyhow::Result;

use factory_lib::trainer::TrainingRequest;

use crate::context::AppContext;
use crate::output::{print_success, print_warning};

/// Launch the external training pipeline and stream its logs. Ctrl-C
/// terminates the child explicitly; nothing else ever kills it.
pub async fn run(
    ctx: &AppContext,
    data: &Path,
    output: &Path,
    train_config: &Path,
    report: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let runner = ctx.training_runner(timeout_secs);
    let request = TrainingRequest {
        data_path: data.to_path_buf(),
        output_dir: output.to_path_buf(),
        config_path: train_config.to_path_buf(),
        report,
    };

    let mut job = runner.spawn(&request).await?;

    tokio::select! {
        result = job.wait() => {
            let summary = result?;
            print_success(&format!(
                "training finished in {:.1}s (exit code {})",
                summary.duration.as_secs_f64(),
                summary.exit_code
            ));
        }
        _ = tokio::signal::ctrl_c() => {
            print_warning("interrupt received, cancelling training");
            job.cancel().await?;
        }
    }

    Ok(())
}
