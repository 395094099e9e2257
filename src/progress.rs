//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Spinner per pumped side, shown only on an interactive stderr
#[derive(Debug)]
pub struct ProgressReporter {
    pub pump_pb: Option<ProgressBar>,
    show_progress: bool,
}

impl ProgressReporter {
    /// Create a progress reporter; spinners appear only when stderr is a terminal
    pub fn new(show_progress: bool) -> Self {
        Self {
            pump_pb: None,
            show_progress: show_progress && std::io::stderr().is_terminal(),
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            pump_pb: None,
            show_progress: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.show_progress
    }

    /// Start a spinner for one side of a spec
    pub fn start_pump(&mut self, spec: &str, source: &str) {
        self.finish_pump();
        if self.show_progress {
            self.pump_pb = Some(create_spinner(&format!("{}: reading {}...", spec, source)));
        }
    }

    /// Update the number of rows staged so far
    pub fn update_rows(&mut self, rows: u64) {
        if let Some(pb) = &self.pump_pb {
            pb.set_position(rows);
        }
    }

    /// Finish the current spinner, leaving nothing behind
    pub fn finish_pump(&mut self) {
        if let Some(pb) = self.pump_pb.take() {
            pb.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish_pump();
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg} {pos} rows")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
