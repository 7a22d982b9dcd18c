//! CLI output formatting utilities.

use crate::orchestrator::IterationOutcome;
use console::style;

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one iteration's outcome.
    pub fn iteration(outcome: &IterationOutcome) {
        match outcome {
            IterationOutcome::Completed(report) => {
                let marker = if report.distribution.is_success() {
                    style("✓").green()
                } else {
                    style("!").yellow()
                };
                println!(
                    "  {} #{} {} ({}, {})",
                    marker,
                    report.iteration,
                    style(&report.subject).bold(),
                    format_duration(report.video.duration),
                    report.distribution
                );
                println!("      {}", style(report.video.path.display()).dim());
            }
            IterationOutcome::Failed {
                iteration,
                stage,
                reason,
            } => {
                println!(
                    "  {} #{} failed during {}",
                    style("✗").red(),
                    iteration,
                    style(stage).bold()
                );
                println!("      {}", style(reason).dim());
            }
        }
    }

    /// Print the end-of-run summary.
    pub fn run_summary(outcomes: &[IterationOutcome]) {
        Self::header("Run Summary");
        for outcome in outcomes {
            Self::iteration(outcome);
        }
        println!();

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let message = format!("{}/{} videos created", succeeded, outcomes.len());
        if succeeded == outcomes.len() {
            Self::success(&message);
        } else {
            Self::warning(&message);
        }
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.round() as u32;
    let minutes = total_seconds / 60;
    let secs = total_seconds % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(4.4), "4s");
        assert_eq!(format_duration(59.6), "1m 0s");
        assert_eq!(format_duration(95.0), "1m 35s");
    }
}
