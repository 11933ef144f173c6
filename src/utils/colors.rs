// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Terminal color utilities
//!
//! Provides consistent output for step progress and CLI messages.

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use std::time::Duration;

/// Check if colors should be used on stdout
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    console::Term::stdout().features().colors_supported()
}

/// Format a timestamp in local time
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a duration as seconds, or minutes and seconds past one minute
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let whole = duration.as_secs();
        format!("{}m{:02}s", whole / 60, whole % 60)
    }
}

/// Print the banner announcing a step
pub fn print_banner(index: usize, total: usize, step: &str) {
    println!(
        "{} {}",
        format!("[{}/{}]", index, total).cyan().bold(),
        step.bold()
    );
}

/// Print that a step was skipped because it already completed
pub fn print_skipped(step: &str, completed_at: Option<DateTime<Utc>>) {
    let when = completed_at
        .map(|at| format!(" (completed {})", format_timestamp(&at)))
        .unwrap_or_default();
    println!("  {} {}{}", "○".dimmed(), step.dimmed(), when.dimmed());
}

/// Print that a step finished successfully
pub fn print_completed(step: &str, duration: Duration) {
    println!(
        "  {} {} ({})",
        "✓".green(),
        step.bold(),
        format_duration(duration)
    );
}

/// Print that a step failed
pub fn print_failed(step: &str) {
    println!("  {} {} failed", "✗".red(), step.bold());
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

/// Print an info item
pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
