//! Binary entry point for the Burrow CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use burrow::{
    ComputeError, ConfigError, ControlDirError, Ec2CliClient, LifecycleError, Outcome,
    ProcessCommandRunner, ProvisioningLifecycle, Settings, SshTunnel, StderrProgress,
    StdinConsole, TunnelError, cancel_channel, control_dir, install_signal_handlers,
};

mod cli;

use cli::Cli;

/// Exit code reported when a cancellation signal ended the run.
const SIGNAL_EXIT_CODE: i32 = 255;

#[derive(Debug, Error)]
enum RunFailure {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("control directory error: {0}")]
    ControlDir(#[from] ControlDirError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] io::Error),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError<ComputeError, TunnelError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(Outcome::Completed) => 0,
        Ok(Outcome::Cancelled) => SIGNAL_EXIT_CODE,
        Err(err) => {
            report_failure(&err);
            exit_code_for(&err)
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<Outcome, RunFailure> {
    let mut settings = Settings::load_without_cli_args()?;
    apply_overrides(&mut settings, &cli);
    init_tracing(settings.verbose);
    settings.validate()?;

    let launch = settings.launch_spec()?;
    let plan = settings.tunnel_plan();
    control_dir::prepare(&settings.control_dir_path())?;

    if cli.check {
        writeln!(io::stdout(), "configuration OK").ok();
        return Ok(Outcome::Completed);
    }

    let (handle, mut token) = cancel_channel();
    install_signal_handlers(&handle)?;

    let runner = ProcessCommandRunner;
    let compute = Ec2CliClient::new(runner, settings.aws_bin.clone(), settings.profile.clone());
    let tunnel = SshTunnel::new(runner, settings.ssh_bin.clone());
    let lifecycle = ProvisioningLifecycle::new(
        compute,
        tunnel,
        StderrProgress,
        settings.poll_wait_seconds,
    );
    let mut console = StdinConsole::new(settings.local_port);

    lifecycle
        .run(&launch, &plan, &mut console, &mut token)
        .await
        .map_err(RunFailure::from)
}

/// Layers command-line flags over the loaded settings. Flags always win
/// over environment variables and configuration files.
fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(ref ami_id) = cli.ami_id {
        settings.ami_id.clone_from(ami_id);
    }
    if let Some(ref control_dir) = cli.control_dir {
        settings.control_dir.clone_from(control_dir);
    }
    if let Some(ref key_file) = cli.key_file {
        settings.key_file.clone_from(key_file);
    }
    if let Some(ref key_name) = cli.key_name {
        settings.key_name.clone_from(key_name);
    }
    if let Some(local_port) = cli.local_port {
        settings.local_port = local_port;
    }
    if let Some(ref profile) = cli.profile {
        settings.profile = Some(profile.clone());
    }
    if let Some(ref security_group) = cli.security_group {
        settings.security_group = Some(security_group.clone());
    }
    if let Some(ref instance_type) = cli.instance_type {
        settings.instance_type.clone_from(instance_type);
    }
    if let Some(poll_wait_seconds) = cli.poll_wait_seconds {
        settings.poll_wait_seconds = poll_wait_seconds;
    }
    if cli.verbose {
        settings.verbose = true;
    }
}

/// Initialises tracing to standard error so diagnostics never interleave
/// with the proxy banner or prompt handling on standard output.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "burrow=debug" } else { "burrow=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

const fn exit_code_for(err: &RunFailure) -> i32 {
    match err {
        RunFailure::Config(_) | RunFailure::ControlDir(_) | RunFailure::Signals(_) => 3,
        RunFailure::Lifecycle(lifecycle) => match lifecycle {
            LifecycleError::Launch(_) => 4,
            LifecycleError::PollTimeout { .. } => 5,
            LifecycleError::Poll { .. } => 6,
            LifecycleError::MissingAddress { .. } => 7,
            LifecycleError::Connect { .. } => 8,
            LifecycleError::Teardown { .. } => 128,
        },
    }
}

fn report_failure(err: &RunFailure) {
    write_failure(io::stderr(), err);
}

fn write_failure(mut target: impl Write, err: &RunFailure) {
    writeln!(target, "error: {err}").ok();
    if let RunFailure::Lifecycle(LifecycleError::Teardown {
        instance_id,
        remediation,
        ..
    }) = err
    {
        writeln!(
            target,
            "instance {instance_id} may still be running and accruing charges"
        )
        .ok();
        writeln!(target, "terminate it by hand: {remediation}").ok();
    }
}

#[cfg(test)]
mod tests {
    use burrow::InstanceId;

    use super::*;

    fn base_settings() -> Settings {
        Settings {
            ami_id: String::from("ami-0abc"),
            instance_type: String::from("t3.micro"),
            security_group: None,
            key_name: String::from("proxy-key"),
            key_file: String::from("/home/op/.ssh/proxy.pem"),
            control_dir: String::from("/home/op/.burrow/ctl"),
            local_port: 1080,
            poll_wait_seconds: 3,
            profile: None,
            ssh_user: String::from("ec2-user"),
            ssh_bin: String::from("ssh"),
            aws_bin: String::from("aws"),
            verbose: false,
        }
    }

    #[test]
    fn flags_override_loaded_settings() {
        let mut settings = base_settings();
        let cli = Cli {
            ami_id: Some(String::from("ami-0def")),
            local_port: Some(9050),
            profile: Some(String::from("sandbox")),
            verbose: true,
            ..Cli::default()
        };

        apply_overrides(&mut settings, &cli);

        assert_eq!(settings.ami_id, "ami-0def");
        assert_eq!(settings.local_port, 9050);
        assert_eq!(settings.profile, Some(String::from("sandbox")));
        assert!(settings.verbose);
        assert_eq!(settings.key_name, "proxy-key");
    }

    #[test]
    fn absent_flags_leave_settings_untouched() {
        let mut settings = base_settings();
        apply_overrides(&mut settings, &Cli::default());
        assert_eq!(settings, base_settings());
    }

    #[test]
    fn exit_codes_match_failure_categories() {
        let poll_error = |operation| ComputeError::Parse {
            operation,
            message: String::from("bad payload"),
        };

        let cases: Vec<(RunFailure, i32)> = vec![
            (
                RunFailure::Config(ConfigError::Invalid(String::from("x"))),
                3,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::Launch(poll_error("run-instances"))),
                4,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::PollTimeout { attempts: 10 }),
                5,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::Poll {
                    attempt: 1,
                    source: poll_error("describe-instances"),
                }),
                6,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::MissingAddress {
                    instance_id: InstanceId::from("i-1"),
                }),
                7,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::Connect {
                    attempts: 11,
                    source: TunnelError::StartFailed {
                        status: String::from("255"),
                        stderr: String::from("refused"),
                    },
                }),
                8,
            ),
            (
                RunFailure::Lifecycle(LifecycleError::Teardown {
                    instance_id: InstanceId::from("i-1"),
                    remediation: String::from("aws ec2 terminate-instances --instance-ids i-1"),
                    source: poll_error("terminate-instances"),
                }),
                128,
            ),
        ];

        for (failure, expected) in cases {
            assert_eq!(exit_code_for(&failure), expected, "failure: {failure}");
        }
    }

    #[test]
    fn teardown_failures_include_the_remediation_command() {
        let failure = RunFailure::Lifecycle(LifecycleError::Teardown {
            instance_id: InstanceId::from("i-0badcafe"),
            remediation: String::from("aws ec2 terminate-instances --instance-ids i-0badcafe"),
            source: ComputeError::Parse {
                operation: "terminate-instances",
                message: String::from("boom"),
            },
        });

        let mut buf = Vec::new();
        write_failure(&mut buf, &failure);
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));

        assert!(rendered.contains("i-0badcafe"), "rendered: {rendered}");
        assert!(
            rendered.contains("terminate-instances --instance-ids i-0badcafe"),
            "rendered: {rendered}"
        );
    }
}
