//! Inference command, with optional shadow comparison

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;

use factory_lib::inference::InferenceEngine;
use factory_lib::transform::FeatureTensors;
use factory_lib::InferenceResult;

use crate::context::AppContext;
use crate::output::{color_label, format_probabilities, print_warning, OutputFormat};

/// Row for the prediction table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Row")]
    row: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Probabilities")]
    probabilities: String,
    #[tabled(rename = "Model")]
    model: String,
}

/// Row for the shadow comparison table
#[derive(Tabled)]
struct ShadowRow {
    #[tabled(rename = "Row")]
    row: usize,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Candidate")]
    candidate: String,
    #[tabled(rename = "Agree")]
    agree: String,
    #[tabled(rename = "Max Δp")]
    max_delta: String,
}

#[derive(Serialize)]
struct ShadowReport {
    current: InferenceResult,
    candidate: InferenceResult,
}

/// Validate, transform, and predict every row of a CSV file.
pub async fn run(
    ctx: &AppContext,
    data: &Path,
    candidate_model: Option<&Path>,
    use_candidate: bool,
    shadow: bool,
    format: OutputFormat,
) -> Result<()> {
    let (rows, errors) = ctx.load_and_validate(data)?;
    if !errors.is_empty() {
        for error in &errors {
            print_warning(&error.to_string());
        }
        bail!("{} validation errors; fix the data before predicting", errors.len());
    }

    let records = ctx.records(&rows)?;
    let engine = ctx.engine()?;
    if let Some(path) = candidate_model {
        engine.set_candidate(path)?;
    }
    if (use_candidate || shadow) && !engine.has_candidate() {
        bail!("no candidate model loaded; pass --candidate-model");
    }

    let transformer = ctx.transformer();
    let tensors = transformer.to_features(&records)?;

    // Inference is CPU-bound; run it off the async thread and bound it so
    // an interactive call cannot hang the terminal on a degenerate model.
    let timeout = ctx.config.predict_timeout();
    let worker_engine = engine.clone();
    let results = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || {
            predict_batch(&worker_engine, &tensors, use_candidate, shadow)
        }),
    )
    .await
    .with_context(|| format!("prediction timed out after {:?}", timeout))?
    .context("prediction task panicked")??;

    render(&results, shadow, format)?;
    let stats = engine.stats();
    tracing::debug!(
        total_inferences = stats.total_inferences,
        slow_inferences = stats.slow_inferences,
        "Prediction run finished"
    );
    engine.close();
    Ok(())
}

fn predict_batch(
    engine: &Arc<InferenceEngine>,
    tensors: &FeatureTensors,
    use_candidate: bool,
    shadow: bool,
) -> Result<Vec<(InferenceResult, Option<InferenceResult>)>> {
    let mut results = Vec::with_capacity(tensors.record_count());
    for index in 0..tensors.record_count() {
        let features = tensors
            .record(index)
            .context("record index out of range")?;
        if shadow {
            let current = engine.predict(&features, false)?;
            let candidate = engine.predict(&features, true)?;
            results.push((current, Some(candidate)));
        } else {
            results.push((engine.predict(&features, use_candidate)?, None));
        }
    }
    Ok(results)
}

fn render(
    results: &[(InferenceResult, Option<InferenceResult>)],
    shadow: bool,
    format: OutputFormat,
) -> Result<()> {
    match (format, shadow) {
        (OutputFormat::Json, false) => {
            let plain: Vec<&InferenceResult> = results.iter().map(|(r, _)| r).collect();
            println!("{}", serde_json::to_string_pretty(&plain)?);
        }
        (OutputFormat::Json, true) => {
            let reports: Vec<ShadowReport> = results
                .iter()
                .filter_map(|(current, candidate)| {
                    candidate.as_ref().map(|c| ShadowReport {
                        current: current.clone(),
                        candidate: c.clone(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        (OutputFormat::Table, false) => {
            let table_rows: Vec<PredictionRow> = results
                .iter()
                .enumerate()
                .map(|(i, (result, _))| PredictionRow {
                    row: i,
                    label: color_label(&result.label, &result.probabilities),
                    probabilities: format_probabilities(&result.probabilities),
                    model: result.model_role.to_string(),
                })
                .collect();
            let table = tabled::Table::new(table_rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} predictions", results.len());
        }
        (OutputFormat::Table, true) => {
            let table_rows: Vec<ShadowRow> = results
                .iter()
                .enumerate()
                .filter_map(|(i, (current, candidate))| {
                    candidate.as_ref().map(|candidate| ShadowRow {
                        row: i,
                        current: current.label.clone(),
                        candidate: candidate.label.clone(),
                        agree: if current.label == candidate.label {
                            "yes".to_string()
                        } else {
                            "NO".to_string()
                        },
                        max_delta: format!(
                            "{:.3}",
                            max_probability_delta(&current.probabilities, &candidate.probabilities)
                        ),
                    })
                })
                .collect();
            let disagreements = table_rows.iter().filter(|r| r.agree == "NO").count();
            let table = tabled::Table::new(table_rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!(
                "\nShadow run: {} rows, {} disagreements",
                results.len(),
                disagreements
            );
        }
    }
    Ok(())
}

fn max_probability_delta(current: &[f64], candidate: &[f64]) -> f64 {
    current
        .iter()
        .zip(candidate.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_probability_delta() {
        assert_eq!(max_probability_delta(&[0.9, 0.1], &[0.6, 0.4]), 0.3);
        assert_eq!(max_probability_delta(&[], &[]), 0.0);
    }
}
