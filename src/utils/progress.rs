//! Download progress reporting.
//!
//! Progress bars are hidden after [`disable_progress`] (the CLI calls it for
//! `--no-progress`), when `RELAYCTL_NO_PROGRESS` is set, or when stderr is
//! not a terminal.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable that disables progress output.
pub const NO_PROGRESS_ENV: &str = "RELAYCTL_NO_PROGRESS";

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Turns progress output off for the rest of the process.
pub fn disable_progress() {
    DISABLED.store(true, Ordering::Relaxed);
}

/// Whether progress bars should be drawn.
pub fn progress_enabled() -> bool {
    !DISABLED.load(Ordering::Relaxed)
        && std::env::var_os(NO_PROGRESS_ENV).is_none()
        && std::io::stderr().is_terminal()
}

/// Bar for a download of `total` bytes, or a byte-counting spinner when the
/// server sent no length.
pub fn download_bar(label: &str, total: Option<u64>) -> ProgressBar {
    if !progress_enabled() {
        return ProgressBar::hidden();
    }

    let bar = match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .map(|s| s.progress_chars("━╸━"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{prefix:.bold.cyan} {spinner:.cyan} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        }
    };
    bar.set_prefix(label.to_string());
    bar
}
