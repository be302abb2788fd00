//! Terminal progress output.

use strata_core::research::{ProgressSink, ProgressUpdate};

/// Prints one line per phase transition to stderr.
pub struct TerminalProgressSink {
    quiet: bool,
}

impl TerminalProgressSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

pub fn format_update(update: &ProgressUpdate) -> String {
    format!("[{:>3}%] {}", update.progress_percent, update.current_task)
}

impl ProgressSink for TerminalProgressSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        if !self.quiet {
            eprintln!("  {}", format_update(update));
        }
    }
}
