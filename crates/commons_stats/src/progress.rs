use std::time::Duration;

use commons_stats_core::walker::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {pos} {msg}";

/// Terminal progress for a category walk. The advisory total sets the bar length; without
/// one the bar runs as a spinner counting files.
pub struct BarProgress {
    bar: ProgressBar,
    label: String,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        Self::with_bar(ProgressBar::no_length(), label)
    }

    fn with_bar(bar: ProgressBar, label: &str) -> Self {
        Self {
            bar,
            label: label.to_string(),
        }
    }
}

impl ProgressSink for BarProgress {
    fn begin(&mut self, total: Option<u64>) {
        match total {
            Some(total) => {
                self.bar.set_length(total);
                if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                    self.bar.set_style(style.progress_chars("#>-"));
                }
            }
            None => {
                if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
                    self.bar.set_style(style);
                }
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
        }
        self.bar.set_message(self.label.clone());
    }

    fn advance(&mut self, current: usize) {
        self.bar.set_position(current as u64);
    }

    fn finish(&mut self, current: usize) {
        self.bar.set_position(current as u64);
        // A stale category count can undershoot the files actually walked.
        if self.bar.length().is_some_and(|length| length < current as u64) {
            self.bar.set_length(current as u64);
        }
        self.bar.finish_with_message(format!("{} done", self.label));
    }
}
