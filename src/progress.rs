//! Cosmetic progress reporting, decoupled from retry and timeout logic.

use std::io::{self, Write};

/// Observer invoked once per second of each inter-attempt delay.
///
/// The indicator character is derived from the raw provider state (or a dot
/// during tunnel retries) and is purely cosmetic; no control decision ever
/// depends on it.
pub trait ProgressObserver {
    /// Emits one progress indicator.
    fn tick(&self, indicator: char);
}

/// Observer that writes indicator characters to standard error.
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrProgress;

impl ProgressObserver for StderrProgress {
    fn tick(&self, indicator: char) {
        let mut stderr = io::stderr();
        write!(stderr, "{indicator}").ok();
        stderr.flush().ok();
    }
}

/// Observer that discards all output, for headless use.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn tick(&self, _indicator: char) {}
}
