// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use is_terminal::IsTerminal;

const BAR_LENGTH: u64 = 1000;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {msg:<28} [{bar:30.cyan/blue}] {percent:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn draw_target(hidden: bool) -> ProgressDrawTarget {
    if hidden || !std::io::stderr().is_terminal() {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stderr()
    }
}

/// Creates a spinner for waiting on the update server.
pub fn create_fetch_spinner(message: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(None, draw_target(hidden));
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar fed with `(stage, fraction)` status updates.
pub struct StageBar {
    bar: ProgressBar,
}

impl StageBar {
    pub fn new(hidden: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(BAR_LENGTH), draw_target(hidden));
        bar.set_style(bar_style());
        Self { bar }
    }

    pub fn update(&self, stage: &str, progress: f64) {
        self.bar.set_message(stage.to_string());
        self.bar.set_position(position(progress));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn position(progress: f64) -> u64 {
    (progress.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}
