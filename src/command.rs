//! Subprocess execution abstraction shared by the provider and tunnel
//! adapters.
//!
//! Both external collaborators are driven through their operating-system
//! CLIs. Wrapping process execution behind [`CommandRunner`] lets the
//! adapters be unit tested with scripted fakes instead of real processes.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit code for error messages, tolerating its absence.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Raised when a command cannot be started at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to spawn {program}: {message}")]
pub struct SpawnError {
    /// Program that could not be started.
    pub program: String,
    /// Human-readable error message.
    pub message: String,
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| SpawnError {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Renders a command line for diagnostics, joining program and arguments.
#[must_use]
pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_owned());
    parts.extend(args.iter().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_reports_missing_code() {
        let output = CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(output.status_text(), "unknown");
        assert!(!output.is_success());
    }

    #[test]
    fn render_command_joins_program_and_args() {
        let args = vec![OsString::from("ec2"), OsString::from("run-instances")];
        assert_eq!(render_command("aws", &args), "aws ec2 run-instances");
    }

    #[test]
    fn process_runner_captures_exit_code() {
        let runner = ProcessCommandRunner;
        let output = runner
            .run("sh", &[OsString::from("-c"), OsString::from("exit 3")])
            .unwrap_or_else(|err| panic!("spawn sh: {err}"));
        assert_eq!(output.code, Some(3));
    }

    #[test]
    fn process_runner_reports_spawn_failure() {
        let runner = ProcessCommandRunner;
        let result = runner.run("burrow-definitely-not-a-binary", &[]);
        assert!(matches!(result, Err(SpawnError { ref program, .. }) if program.contains("burrow")));
    }
}
