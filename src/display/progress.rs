//! Progress tracking utilities for long-running operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a styled progress bar for document processing.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Display a temporary spinner while `operation` runs.
///
/// `visible == false` runs the operation without drawing anything, which is
/// what JSON output wants.
pub fn with_spinner<F, T>(message: &str, visible: bool, operation: F) -> T
where
    F: FnOnce() -> T,
{
    if !visible {
        return operation();
    }
    let spinner = create_spinner(message);
    let result = operation();
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_spinner_runs_operation() {
        assert_eq!(with_spinner("working", false, || 21 * 2), 42);
    }

    #[test]
    fn test_progress_bar_length() {
        let pb = create_progress_bar(5, "embedding");
        pb.inc(2);
        assert_eq!(pb.length(), Some(5));
        assert_eq!(pb.position(), 2);
        pb.finish_and_clear();
    }
}
