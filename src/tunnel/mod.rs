//! Tunnel process abstraction and the SSH SOCKS5 implementation.
//!
//! The tunnel runs as a background `ssh` process with a ControlMaster
//! socket, relaying local SOCKS5 traffic over the encrypted connection. The
//! lifecycle only depends on the [`TunnelProcess`] contract: start with the
//! resolved target address, stop through the control channel on teardown.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::command::{CommandRunner, SpawnError, render_command};

/// Default SSH port on freshly provisioned instances.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Settings known before the instance address is resolved.
///
/// Once the instance reports a public address, [`TunnelPlan::spec_for`]
/// completes the plan into a concrete [`TunnelSpec`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelPlan {
    /// Local port the SOCKS5 proxy binds to.
    pub local_port: u16,
    /// Remote SSH port on the instance.
    pub ssh_port: u16,
    /// Private key file used for authentication.
    pub key_file: Utf8PathBuf,
    /// Directory holding control sockets.
    pub control_dir: Utf8PathBuf,
    /// Remote user to connect as.
    pub ssh_user: String,
}

impl TunnelPlan {
    /// Completes the plan with the instance's public address.
    ///
    /// The control socket name follows the `user@host:port` convention shared
    /// with the SSH client so a later `stop` addresses the same channel.
    #[must_use]
    pub fn spec_for(&self, target_address: &str) -> TunnelSpec {
        let socket_name = format!("{}@{}:{}", self.ssh_user, target_address, self.ssh_port);
        TunnelSpec {
            target_address: target_address.to_owned(),
            local_port: self.local_port,
            ssh_port: self.ssh_port,
            key_file: self.key_file.clone(),
            control_socket: self.control_dir.join(socket_name),
            ssh_user: self.ssh_user.clone(),
        }
    }
}

/// Fully resolved parameters for one tunnel connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TunnelSpec {
    /// Public address of the instance.
    pub target_address: String,
    /// Local port the SOCKS5 proxy binds to.
    pub local_port: u16,
    /// Remote SSH port on the instance.
    pub ssh_port: u16,
    /// Private key file used for authentication.
    pub key_file: Utf8PathBuf,
    /// Control socket path for this connection.
    pub control_socket: Utf8PathBuf,
    /// Remote user to connect as.
    pub ssh_user: String,
}

impl TunnelSpec {
    /// Returns the `user@host` destination string.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.ssh_user, self.target_address)
    }
}

/// Errors raised by the SSH tunnel adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TunnelError {
    /// Raised when the SSH client cannot be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Raised when tunnel establishment exits non-zero.
    #[error("tunnel start failed with status {status}: {stderr}")]
    StartFailed {
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error from the SSH client.
        stderr: String,
    },
    /// Raised when the control-channel close request exits non-zero.
    #[error("tunnel stop failed with status {status}: {stderr}")]
    StopFailed {
        /// Exit status rendered for display.
        status: String,
        /// Captured standard error from the SSH client.
        stderr: String,
    },
}

/// Future returned by tunnel operations.
pub type TunnelFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by tunnel transports.
pub trait TunnelProcess {
    /// Transport specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establishes a background tunnel bound to the spec's local port.
    fn start<'a>(&'a self, spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error>;

    /// Asks the running tunnel to close via its control channel.
    fn stop<'a>(&'a self, spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error>;
}

/// Tunnel transport backed by the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshTunnel<R: CommandRunner> {
    runner: R,
    ssh_bin: String,
}

impl<R: CommandRunner> SshTunnel<R> {
    /// Creates a transport that invokes `ssh_bin` through `runner`.
    #[must_use]
    pub fn new(runner: R, ssh_bin: impl Into<String>) -> Self {
        Self {
            runner,
            ssh_bin: ssh_bin.into(),
        }
    }

    fn start_args(spec: &TunnelSpec) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(spec.key_file.as_str()),
            OsString::from("-p"),
            OsString::from(spec.ssh_port.to_string()),
        ];
        args.extend(Self::batch_options());
        args.push(OsString::from("-o"));
        args.push(OsString::from("ExitOnForwardFailure=yes"));
        args.push(OsString::from("-M"));
        args.push(OsString::from("-S"));
        args.push(OsString::from(spec.control_socket.as_str()));
        args.push(OsString::from("-fNT"));
        args.push(OsString::from("-D"));
        args.push(OsString::from(spec.local_port.to_string()));
        args.push(OsString::from(spec.destination()));
        args
    }

    fn stop_args(spec: &TunnelSpec) -> Vec<OsString> {
        vec![
            OsString::from("-S"),
            OsString::from(spec.control_socket.as_str()),
            OsString::from("-O"),
            OsString::from("exit"),
            OsString::from(spec.destination()),
        ]
    }

    /// Options smoothing connections to ephemeral hosts: no password
    /// prompts, no host-key persistence.
    fn batch_options() -> Vec<OsString> {
        vec![
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
        ]
    }

    fn start_sync(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        let args = Self::start_args(spec);
        debug!(command = %render_command(&self.ssh_bin, &args), "starting tunnel");
        let output = self.runner.run(&self.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }
        Err(TunnelError::StartFailed {
            status: output.status_text(),
            stderr: output.stderr,
        })
    }

    fn stop_sync(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        let args = Self::stop_args(spec);
        debug!(command = %render_command(&self.ssh_bin, &args), "stopping tunnel");
        let output = self.runner.run(&self.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }
        Err(TunnelError::StopFailed {
            status: output.status_text(),
            stderr: output.stderr,
        })
    }
}

impl<R> TunnelProcess for SshTunnel<R>
where
    R: CommandRunner + Send + Sync,
{
    type Error = TunnelError;

    fn start<'a>(&'a self, spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error> {
        Box::pin(async move { self.start_sync(spec) })
    }

    fn stop<'a>(&'a self, spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error> {
        Box::pin(async move { self.stop_sync(spec) })
    }
}
