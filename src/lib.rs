//! Core library for the Burrow SOCKS5 proxy tool.
//!
//! The crate provisions one disposable cloud instance, establishes an SSH
//! SOCKS5 tunnel through it, supervises the session interactively, and
//! guarantees that the instance is terminated on every exit path, including
//! signals. Both external collaborators (the provider control plane and the
//! SSH tunnel) sit behind narrow traits so the lifecycle can be tested with
//! scripted fakes.

pub mod cancel;
pub mod command;
pub mod compute;
pub mod config;
pub mod console;
pub mod control_dir;
pub mod lifecycle;
pub mod paths;
pub mod progress;
pub mod test_support;
pub mod tunnel;

pub use cancel::{CancelHandle, CancelToken, cancel_channel, install_signal_handlers};
pub use command::{CommandOutput, CommandRunner, ProcessCommandRunner, SpawnError};
pub use compute::{
    ComputeClient, ComputeError, Ec2CliClient, InstanceId, InstanceStatus, LaunchSpec,
    LaunchSpecBuilder,
};
pub use config::{ConfigError, Settings};
pub use console::{Console, StdinConsole};
pub use control_dir::ControlDirError;
pub use lifecycle::{
    DEFAULT_POLL_ATTEMPTS, DEFAULT_TUNNEL_ATTEMPTS, LifecycleError, Outcome,
    ProvisioningLifecycle,
};
pub use progress::{ProgressObserver, SilentProgress, StderrProgress};
pub use tunnel::{DEFAULT_SSH_PORT, SshTunnel, TunnelError, TunnelPlan, TunnelProcess, TunnelSpec};
