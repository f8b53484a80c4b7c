//! Error types for the provider CLI compute client.

use thiserror::Error;

use crate::command::SpawnError;

/// Errors raised by the provider CLI compute client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Raised when the provider CLI cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when a provider CLI invocation exits non-zero.
    #[error("{operation} failed with status {status}: {stderr}")]
    Failed {
        /// Operation being performed (for example `run-instances`).
        operation: &'static str,
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error from the CLI.
        stderr: String,
    },
    /// Raised when the provider CLI response cannot be parsed.
    #[error("could not parse {operation} response: {message}")]
    Parse {
        /// Operation whose response was malformed.
        operation: &'static str,
        /// Human-readable parse failure description.
        message: String,
    },
    /// Raised when a launch response carries no instance identifier. Without
    /// an identifier there is nothing to terminate later, so proceeding
    /// would risk an untracked billable instance.
    #[error("launch response did not contain an instance id")]
    MissingInstanceId,
}
