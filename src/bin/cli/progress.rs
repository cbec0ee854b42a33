//! Progress bar implementation for CLI operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress display for one stream, tracking compressed bytes consumed
pub struct ByteProgress {
    bar: ProgressBar,
}

impl ByteProgress {
    /// Creates a bar when the compressed size is known, a spinner otherwise
    pub fn new(name: &str, total: Option<u64>, quiet: bool) -> Self {
        let bar = match (quiet, total) {
            (true, _) => ProgressBar::hidden(),
            (false, Some(total)) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} {wide_msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            (false, None) => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {wide_msg} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
        };

        // Truncate long names
        let len = name.chars().count();
        let display_name = if len > 40 {
            let tail: String = name.chars().skip(len - 37).collect();
            format!("...{}", tail)
        } else {
            name.to_string()
        };
        bar.set_message(display_name);

        Self { bar }
    }

    /// Sets the number of compressed bytes consumed
    pub fn set_position(&self, pos: u64) {
        self.bar.set_position(pos);
    }

    /// Removes the bar after success
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Leaves the bar in place with a failure message
    pub fn abandon(&self) {
        self.bar.abandon_with_message("Failed");
    }
}
