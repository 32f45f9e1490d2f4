//! Terminal spinner for slow operations
//!
//! Draws to stderr and stays hidden when stderr is not a terminal, so piped
//! output is unaffected.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Start a spinner showing `message`
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
