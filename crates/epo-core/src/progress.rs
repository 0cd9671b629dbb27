//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: indicatif bars (one byte bar for the download session,
//! spinner/count bars for extraction and parsing).
//! Non-TTY mode: hidden bars, log lines are the only progress output.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Byte-denominated session bar for the download stage.
fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:<40} {bar:40.green/dim} {binary_bytes:>9}/{binary_total_bytes:9} {bytes_per_sec} {eta:>4}",
    )
    .expect("invalid template")
    .progress_chars("=>-")
}

/// Count-denominated bar for the parse stage.
fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<40} {bar:40.green/dim} {pos:>6}/{len:6} {eta:>4}")
        .expect("invalid template")
        .progress_chars("=>-")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Byte-sized session bar. Hidden off-TTY.
    pub fn bytes_bar(&self, total: u64, message: impl Into<String>) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(bytes_style());
        pb.set_message(message.into());
        pb
    }

    /// Count-sized bar (one tick per processed file). Hidden off-TTY.
    pub fn count_bar(&self, total: u64, message: impl Into<String>) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(count_style());
        pb.set_message(message.into());
        pb
    }

    /// Spinner with a live message for work of unknown size. Hidden off-TTY.
    pub fn spinner(&self, message: impl Into<String>) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {wide_msg}").expect("invalid template"),
        );
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle shared across stage workers.
pub type SharedProgress = Arc<ProgressContext>;
