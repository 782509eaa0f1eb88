//! Spinners for waits with no output of their own (health probes).
//!
//! Spinners draw on stderr so stdout stays clean for piping.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);
const FRAMES: &[&str] = &["◐", "◓", "◑", "◒", " "];

/// A ticking spinner labelled `msg`.
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(FRAMES);
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

/// [`spinner`] when `show`, otherwise a hidden bar with the same API.
#[must_use]
pub fn maybe_spinner(show: bool, msg: &str) -> ProgressBar {
    if show {
        spinner(msg)
    } else {
        ProgressBar::hidden()
    }
}

/// Remove the spinner line before the result is printed.
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
