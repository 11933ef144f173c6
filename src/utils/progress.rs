// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Download progress bars

use indicatif::{ProgressBar, ProgressStyle};

/// Whether progress bars should be drawn (stderr is an attended terminal)
pub fn progress_enabled() -> bool {
    console::user_attended_stderr()
}

/// Create a progress bar for a transfer of `total` bytes (unknown if `None`).
///
/// Returns a hidden bar when `enabled` is false, so callers can update it
/// unconditionally.
pub fn create_download_bar(total: Option<u64>, label: String, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            {
                bar.set_style(style.progress_chars("█▓░"));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .template("  {spinner:.blue} {msg} {bytes} ({bytes_per_sec})")
            {
                bar.set_style(style);
            }
            bar
        }
    };
    bar.set_message(label);
    bar
}
