//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Line counter shared by every pipeline run of a merge
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a tracker; a disabled tracker still counts but draws nothing
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let pb = if enabled {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} lines ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        Self { progress_bar: pb }
    }

    /// Account for `lines` more lines to be written
    pub fn add_total(&self, lines: u64) {
        self.progress_bar.inc_length(lines);
    }

    /// Record one written line
    pub fn line_written(&self) {
        self.progress_bar.inc(1);
    }

    /// Lines written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.progress_bar.position()
    }

    /// Stop the bar and leave a completion message
    pub fn finish(&self) {
        self.progress_bar.finish_with_message("Merge completed");
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(false)
    }
}
