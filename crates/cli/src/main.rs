//! Factory ML CLI
//!
//! A command-line tool for validating production CSV data, running model
//! inference and what-if simulations, managing the model lifecycle, and
//! launching the external training pipeline.

mod commands;
mod config;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{model, predict, simulate, train, validate};

/// Factory ML CLI
#[derive(Parser)]
#[command(name = "fml")]
#[command(author, version, about = "CLI for the factory offline ML system", long_about = None)]
pub struct Cli {
    /// Path to a config file (JSON); FML_* env vars override it
    #[arg(long, env = "FML_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a CSV file against the schema
    Validate {
        /// Path to the CSV file
        #[arg(long, short)]
        data: PathBuf,
    },

    /// Run model inference over a CSV file
    Predict {
        /// Path to the CSV file
        #[arg(long, short)]
        data: PathBuf,

        /// Load this model as the shadow candidate for the run
        #[arg(long)]
        candidate_model: Option<PathBuf>,

        /// Serve predictions from the candidate instead of the current model
        #[arg(long)]
        candidate: bool,

        /// Run current and candidate side by side and compare
        #[arg(long)]
        shadow: bool,
    },

    /// What-if simulation: re-run inference with overridden fields
    Simulate {
        /// Path to the CSV file
        #[arg(long, short)]
        data: PathBuf,

        /// 0-based row index of the record to explore
        #[arg(long, short, default_value_t = 0)]
        row: usize,

        /// Field override, `column=value`; repeatable
        #[arg(long = "set", value_name = "COLUMN=VALUE")]
        overrides: Vec<String>,
    },

    /// Model lifecycle operations
    #[command(subcommand)]
    Model(ModelCommands),

    /// Run the external training pipeline
    Train {
        /// Path to the training data file
        #[arg(long)]
        data: PathBuf,

        /// Directory to write the trained model into
        #[arg(long)]
        output: PathBuf,

        /// Path to the trainer configuration file
        #[arg(long = "train-config")]
        train_config: PathBuf,

        /// Ask the trainer for an analysis report
        #[arg(long)]
        report: bool,

        /// Kill the trainer after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ModelCommands {
    /// Validate a model file without touching the serving session
    Validate {
        /// Path to the candidate model file
        path: PathBuf,
    },

    /// Copy the current model into the archive with a timestamp suffix
    Archive {
        /// Base name for the archived copy
        name: String,
    },

    /// Promote a validated model file to CURRENT
    Switch {
        /// Path to the new model file
        path: PathBuf,
    },

    /// Show the current model and archived versions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = context::AppContext::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { data } => {
            validate::run(&ctx, &data, cli.format)?;
        }
        Commands::Predict {
            data,
            candidate_model,
            candidate,
            shadow,
        } => {
            predict::run(&ctx, &data, candidate_model.as_deref(), candidate, shadow, cli.format)
                .await?;
        }
        Commands::Simulate {
            data,
            row,
            overrides,
        } => {
            simulate::run(&ctx, &data, row, &overrides, cli.format)?;
        }
        Commands::Model(model_cmd) => match model_cmd {
            ModelCommands::Validate { path } => {
                model::validate(&ctx, &path, cli.format)?;
            }
            ModelCommands::Archive { name } => {
                model::archive(&ctx, &name, cli.format)?;
            }
            ModelCommands::Switch { path } => {
                model::switch(&ctx, &path)?;
            }
            ModelCommands::Status => {
                model::status(&ctx, cli.format)?;
            }
        },
        Commands::Train {
            data,
            output,
            train_config,
            report,
            timeout_secs,
        } => {
            train::run(&ctx, &data, &output, &train_config, report, timeout_secs).await?;
        }
    }

    Ok(())
}
