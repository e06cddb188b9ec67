//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Render a probability vector compactly, e.g. "0.910, 0.090"
pub fn format_probabilities(probabilities: &[f64]) -> String {
    probabilities
        .iter()
        .map(|p| format!("{:.3}", p))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Color a predicted label by its top probability
pub fn color_label(label: &str, probabilities: &[f64]) -> String {
    let top = probabilities.iter().cloned().fold(0.0_f64, f64::max);
    if top >= 0.8 {
        label.green().to_string()
    } else if top >= 0.5 {
        label.yellow().to_string()
    } else {
        label.red().to_string()
    }
}
