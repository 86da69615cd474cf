//! Output formatting for the CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use dashprobe_common::{RunSummary, StepState};
use dashprobe_e2e::RunOutcome;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

fn state_cell(state: StepState) -> Cell {
    let cell = Cell::new(state.as_str().to_uppercase());
    match state {
        StepState::Passed => cell.fg(Color::Green),
        StepState::Warned => cell.fg(Color::Yellow),
        StepState::Failed => cell.fg(Color::Red),
        StepState::Pending | StepState::Running => cell.fg(Color::DarkGrey),
    }
}

/// Per-step table followed by the verdict line
pub fn print_summary(outcome: &RunOutcome, format: OutputFormat) {
    let summary = &outcome.summary;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(vec!["Step", "State", "Attempts", "Duration", "Error"]);
            for step in &summary.steps {
                table.add_row(vec![
                    Cell::new(&step.name),
                    state_cell(step.state),
                    Cell::new(step.attempts),
                    Cell::new(format!("{:.2}s", step.duration_seconds)),
                    Cell::new(step.error.as_deref().unwrap_or("")),
                ]);
            }
            println!("{table}");

            print_verdict(summary);
            for path in &outcome.reports {
                print_info(&format!("Report: {}", path.display()));
            }
            if let Some(log) = &outcome.text_log {
                print_info(&format!("Log: {}", log.display()));
            }
        }
    }
}

fn print_verdict(summary: &RunSummary) {
    let line = format!(
        "{}/{} steps passed or warned ({:.1}%, cutoff {:.1}%) in {:.1}s",
        summary.passed + summary.warned,
        summary.total,
        summary.pass_fraction * 100.0,
        summary.success_cutoff * 100.0,
        summary.duration_seconds
    );
    if summary.aborted {
        print_error(&format!("ABORTED: browser unavailable. {}", line));
    } else if summary.success {
        print_success(&format!("SUCCESS: {}", line));
    } else {
        print_error(&format!("FAILURE: {}", line));
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
