//! Command-line interface definitions for the `burrow` binary.
//!
//! This module centralises the clap parser structure so both the main binary
//! and the build script can reuse it when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `burrow` binary.
///
/// Every flag has a matching `BURROW_`-prefixed environment variable and a
/// key of the same name in `burrow.toml`; flags take precedence over both.
#[derive(Debug, Default, Parser)]
#[command(
    name = "burrow",
    about = "Provision a disposable cloud instance and tunnel through it as a SOCKS5 proxy"
)]
pub(crate) struct Cli {
    /// Enable verbose diagnostics, echoing each outbound provider command.
    #[arg(short = 'v', long)]
    pub(crate) verbose: bool,
    /// Validate the resolved configuration and control directory, then exit.
    #[arg(short = 'c', long = "check")]
    pub(crate) check: bool,
    /// Machine image to boot the instance from.
    #[arg(short = 'a', long, value_name = "AMI_ID")]
    pub(crate) ami_id: Option<String>,
    /// Directory holding the tunnel control socket (created with mode 0700).
    #[arg(short = 'd', long, value_name = "CONTROL_DIR")]
    pub(crate) control_dir: Option<String>,
    /// Private key file used to authenticate the tunnel.
    #[arg(short = 'f', long, value_name = "KEY_FILE")]
    pub(crate) key_file: Option<String>,
    /// Name of the provider-registered key pair to launch with.
    #[arg(short = 'k', long, value_name = "KEY_NAME")]
    pub(crate) key_name: Option<String>,
    /// Local port the SOCKS5 proxy listens on.
    #[arg(short = 'l', long, value_name = "LOCAL_PORT")]
    pub(crate) local_port: Option<u16>,
    /// Named credential profile passed to the provider CLI.
    #[arg(short = 'p', long, value_name = "PROFILE")]
    pub(crate) profile: Option<String>,
    /// Security group applied to the instance.
    #[arg(short = 's', long, value_name = "SECURITY_GROUP")]
    pub(crate) security_group: Option<String>,
    /// Instance type (commercial flavour) to request.
    #[arg(short = 't', long, value_name = "INSTANCE_TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Seconds to pause between instance state polls.
    #[arg(short = 'w', long, value_name = "POLL_WAIT_SECONDS")]
    pub(crate) poll_wait_seconds: Option<u64>,
}
