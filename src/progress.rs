//! Progress display for transfers and extraction
//!
//! A [`Progress`] owns its indicatif bar and clears it when dropped, so an
//! early `?` return never leaves a half-drawn bar behind. When progress is
//! disabled the bar is hidden and every update is a no-op.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const TICK: Duration = Duration::from_millis(80);

const SPINNER_TEMPLATE: &str = "     {spinner:.cyan} {msg}";
const BYTES_TEMPLATE: &str =
    "     {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})";

/// A bar that is cleared on drop.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    /// Indeterminate spinner, e.g. while an external tool runs.
    pub fn spinner(enabled: bool, message: &str) -> Self {
        if !enabled {
            return Self::hidden();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_CHARS),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK);
        Self { bar }
    }

    /// Byte counter for a download starting at `start`.
    ///
    /// Shows a bar when `total` is known and a spinner otherwise.
    pub fn transfer(enabled: bool, name: &str, total: Option<u64>, start: u64) -> Self {
        let progress = Self::spinner(enabled, &format!("downloading {}", name));
        if let Some(total) = total
            && enabled
        {
            progress.bar.set_length(total);
            progress.bar.set_style(
                ProgressStyle::default_bar()
                    .template(BYTES_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("━╸━"),
            );
        }
        progress.bar.set_position(start);
        progress
    }

    fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_with_known_total() {
        let progress = Progress::transfer(true, "lib.7z", Some(1000), 250);
        assert_eq!(progress.bar.length(), Some(1000));
        assert_eq!(progress.position(), 250);

        progress.set_position(600);
        assert_eq!(progress.position(), 600);
    }

    #[test]
    fn test_disabled_progress_still_tracks_position() {
        let progress = Progress::transfer(false, "lib.7z", Some(1000), 40);
        assert_eq!(progress.position(), 40);
        progress.set_position(41);
        assert_eq!(progress.position(), 41);
    }

    #[test]
    fn test_spinner_is_live_until_dropped() {
        let progress = Progress::spinner(true, "extracting");
        assert!(!progress.bar.is_finished());

        let bar = progress.bar.clone();
        drop(progress);
        assert!(bar.is_finished());
    }
}
