//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored outcome
//! lines, JSON lines, the status spinner and the summary table printed on
//! exit.

use crate::outcome::{MoveOutcome, OutcomeKind};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Running counts of outcomes, shown on the spinner and in the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    moved_by_category: HashMap<String, usize>,
    pub skipped_duplicates: usize,
    pub skipped_unmatched: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn record(&mut self, outcome: &MoveOutcome) {
        match &outcome.result {
            OutcomeKind::Moved => {
                let category = outcome.category.clone().unwrap_or_default();
                *self.moved_by_category.entry(category).or_insert(0) += 1;
            }
            OutcomeKind::SkippedDuplicate => self.skipped_duplicates += 1,
            OutcomeKind::SkippedUnmatched => self.skipped_unmatched += 1,
            OutcomeKind::Failed(_) => self.failed += 1,
        }
    }

    pub fn moved(&self) -> usize {
        self.moved_by_category.values().sum()
    }

    pub fn moved_by_category(&self) -> &HashMap<String, usize> {
        &self.moved_by_category
    }

    /// One-line status for the spinner.
    pub fn status_line(&self) -> String {
        format!(
            "{} moved, {} skipped, {} failed",
            self.moved(),
            self.skipped_duplicates + self.skipped_unmatched,
            self.failed
        )
    }
}

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autotidy::output::OutputFormatter;
    /// OutputFormatter::success("Configuration written");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Formats one outcome as a single colored line.
    ///
    /// # Example
    ///
    /// ```
    /// use autotidy::outcome::MoveOutcome;
    /// use autotidy::output::OutputFormatter;
    /// use std::path::Path;
    ///
    /// let outcome = MoveOutcome::skipped_unmatched(Path::new("/dl/README"));
    /// assert!(OutputFormatter::format_outcome(&outcome).contains("README"));
    /// ```
    pub fn format_outcome(outcome: &MoveOutcome) -> String {
        let name = display_name(&outcome.source);
        let category = outcome.category.as_deref().unwrap_or("-");

        match &outcome.result {
            OutcomeKind::Moved => {
                let destination = outcome
                    .destination
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                format!(
                    "{} {} → {} {}",
                    "✓".green(),
                    name,
                    destination,
                    format!("[{}]", category).dimmed()
                )
            }
            OutcomeKind::SkippedDuplicate => format!(
                "{} {} skipped: already exists in {}",
                "⚠".yellow(),
                name,
                category
            ),
            OutcomeKind::SkippedUnmatched => format!(
                "{} {} {}",
                "·".dimmed(),
                name,
                "left in place: no matching category".dimmed()
            ),
            OutcomeKind::Failed(reason) => {
                format!("{} {}: {}", "✗".red(), name, reason.to_string().red())
            }
        }
    }

    /// Prints one outcome; failures go to stderr.
    pub fn outcome(outcome: &MoveOutcome) {
        let line = Self::format_outcome(outcome);
        if outcome.failure().is_some() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    /// Prints one outcome as a JSON object on its own line.
    pub fn json_outcome(outcome: &MoveOutcome) -> Result<(), String> {
        let line = serde_json::to_string(outcome)
            .map_err(|e| format!("Failed to serialize outcome: {}", e))?;
        println!("{}", line);
        Ok(())
    }

    /// Creates a spinner that ticks on its own until finished.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autotidy::output::OutputFormatter;
    /// let spinner = OutputFormatter::create_spinner("watching ~/Downloads");
    /// spinner.set_message("1 moved, 0 skipped, 0 failed");
    /// spinner.finish_and_clear();
    /// ```
    pub fn create_spinner(prefix: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {prefix} {msg:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_prefix(prefix.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    /// Prints a summary table with moved files by category and the other
    /// outcome counts.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autotidy::output::{OutcomeTally, OutputFormatter};
    ///
    /// OutputFormatter::summary_table(&OutcomeTally::default());
    /// ```
    pub fn summary_table(tally: &OutcomeTally) {
        Self::header("SUMMARY");

        // Sort categories for consistent output
        let mut categories: Vec<_> = tally.moved_by_category().iter().collect();
        categories.sort_by_key(|&(name, _)| name);

        let width = categories
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("Skipped (unmatched)".len());

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));

        for (category, count) in &categories {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word(**count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        let moved = tally.moved();
        println!(
            "{:<width$} | {} {}",
            "Moved".bold(),
            moved.to_string().green().bold(),
            file_word(moved),
            width = width
        );
        for (label, count) in [
            ("Skipped (duplicate)", tally.skipped_duplicates),
            ("Skipped (unmatched)", tally.skipped_unmatched),
        ] {
            println!(
                "{:<width$} | {} {}",
                label,
                count.to_string().yellow(),
                file_word(count),
                width = width
            );
        }
        println!(
            "{:<width$} | {} {}",
            "Failed",
            tally.failed.to_string().red(),
            file_word(tally.failed),
            width = width
        );
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::FailureReason;
    use std::path::PathBuf;

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = OutcomeTally::default();
        tally.record(&MoveOutcome::moved(
            Path::new("/dl/a.jpg"),
            PathBuf::from("/img/a.jpg"),
            "Images",
        ));
        tally.record(&MoveOutcome::moved(
            Path::new("/dl/b.jpg"),
            PathBuf::from("/img/b.jpg"),
            "Images",
        ));
        tally.record(&MoveOutcome::skipped_unmatched(Path::new("/dl/README")));
        tally.record(&MoveOutcome::failed(
            Path::new("/dl/c.zip"),
            None,
            FailureReason::PermissionDenied,
        ));

        assert_eq!(tally.moved(), 2);
        assert_eq!(tally.moved_by_category().get("Images"), Some(&2));
        assert_eq!(tally.skipped_unmatched, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.status_line(), "2 moved, 1 skipped, 1 failed");
    }

    #[test]
    fn test_format_outcome_mentions_file_and_reason() {
        let failed = MoveOutcome::failed(
            Path::new("/dl/big.iso"),
            Some("Archives".to_string()),
            FailureReason::DiskFull,
        );
        let line = OutputFormatter::format_outcome(&failed);
        assert!(line.contains("big.iso"));
        assert!(line.contains("disk full"));

        let moved = MoveOutcome::moved(
            Path::new("/dl/a.jpg"),
            PathBuf::from("/dl/img/a(1).jpg"),
            "Images",
        );
        let line = OutputFormatter::format_outcome(&moved);
        assert!(line.contains("a.jpg"));
        assert!(line.contains("a(1).jpg"));
    }
}
