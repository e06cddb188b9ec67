//! What-if simulation command

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;

use factory_lib::simulate::SimulationEngine;
use factory_lib::validate::coerce_cell;
use factory_lib::{FieldValue, InferenceResult};

use crate::context::AppContext;
use crate::output::{format_probabilities, print_info, print_warning, OutputFormat};

/// Row for the baseline/counterfactual comparison table
#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Run")]
    run: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Probabilities")]
    probabilities: String,
}

#[derive(Serialize)]
struct SimulationReport {
    baseline: InferenceResult,
    counterfactual: InferenceResult,
}

/// Re-run inference on a copy of one record with overridden fields. The
/// loaded record itself is never modified.
pub fn run(
    ctx: &AppContext,
    data: &Path,
    row: usize,
    overrides: &[String],
    format: OutputFormat,
) -> Result<()> {
    let (rows, errors) = ctx.load_and_validate(data)?;
    if !errors.is_empty() {
        for error in &errors {
            print_warning(&error.to_string());
        }
        bail!("{} validation errors; fix the data before simulating", errors.len());
    }

    let records = ctx.records(&rows)?;
    let original = records
        .get(row)
        .with_context(|| format!("row {} out of range, file has {} rows", row, records.len()))?;

    let overrides = parse_overrides(ctx, overrides)?;
    if overrides.is_empty() {
        print_info("no overrides given; counterfactual equals baseline");
    }

    let engine = ctx.engine()?;
    let transformer = ctx.transformer();
    let baseline = engine.predict(&transformer.to_feature_vector(original)?, false)?;

    let simulation = SimulationEngine::new(ctx.transformer(), engine.clone());
    let counterfactual = simulation.simulate(original, &overrides)?;

    match format {
        OutputFormat::Json => {
            let report = SimulationReport {
                baseline,
                counterfactual,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let table_rows = vec![
                ComparisonRow {
                    run: "baseline".to_string(),
                    label: baseline.label.clone(),
                    probabilities: format_probabilities(&baseline.probabilities),
                },
                ComparisonRow {
                    run: "what-if".to_string(),
                    label: counterfactual.label.clone(),
                    probabilities: format_probabilities(&counterfactual.probabilities),
                },
            ];
            let table = tabled::Table::new(table_rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            if baseline.label != counterfactual.label {
                print_info(&format!(
                    "prediction changed: {} -> {}",
                    baseline.label, counterfactual.label
                ));
            }
        }
    }

    engine.close();
    Ok(())
}

/// Parse `column=value` pairs, coercing each value with the column's own
/// schema rules so a simulation cannot inject an out-of-type value.
fn parse_overrides(ctx: &AppContext, raw: &[String]) -> Result<BTreeMap<String, FieldValue>> {
    let mut overrides = BTreeMap::new();
    for pair in raw {
        let (column, value) = pair
            .split_once('=')
            .with_context(|| format!("override \"{}\" is not column=value", pair))?;
        let spec = ctx
            .schema
            .column(column)
            .with_context(|| format!("unknown column \"{}\" in override", column))?;
        let typed = if value.trim().is_empty() {
            FieldValue::Missing
        } else {
            coerce_cell(&spec.kind, value)
                .map_err(|message| anyhow::anyhow!("column \"{}\": {}", column, message))?
        };
        overrides.insert(column.to_string(), typed);
    }
    Ok(overrides)
}
