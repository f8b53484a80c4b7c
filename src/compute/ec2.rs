//! Compute client that drives the AWS CLI as a subprocess.
//!
//! Each operation shells out to `aws ec2 …` with `--output json` and parses
//! the response with serde. The CLI owns credential resolution; an optional
//! named profile is forwarded on every invocation.

use std::ffi::OsString;

use serde::Deserialize;
use tracing::debug;

use crate::command::{CommandOutput, CommandRunner, render_command};

use super::error::ComputeError;
use super::{ComputeClient, ComputeFuture, InstanceId, InstanceStatus, LaunchSpec};

/// State reported when the provider returns no record for an instance.
const UNKNOWN_STATE: &str = "unknown";

/// Compute client backed by the `aws` CLI.
#[derive(Clone, Debug)]
pub struct Ec2CliClient<R: CommandRunner> {
    runner: R,
    aws_bin: String,
    profile: Option<String>,
}

impl<R: CommandRunner> Ec2CliClient<R> {
    /// Creates a client that invokes `aws_bin` through `runner`.
    #[must_use]
    pub fn new(runner: R, aws_bin: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            runner,
            aws_bin: aws_bin.into(),
            profile,
        }
    }

    fn run_checked(
        &self,
        operation: &'static str,
        args: Vec<OsString>,
    ) -> Result<CommandOutput, ComputeError> {
        debug!(command = %render_command(&self.aws_bin, &args), "invoking provider CLI");
        let output = self.runner.run(&self.aws_bin, &args)?;
        if output.is_success() {
            return Ok(output);
        }
        Err(ComputeError::Failed {
            operation,
            status: output.status_text(),
            stderr: output.stderr,
        })
    }

    fn common_args(&self, lead: &[&str]) -> Vec<OsString> {
        let mut args: Vec<OsString> = lead.iter().map(OsString::from).collect();
        if let Some(ref profile) = self.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    fn launch_args(&self, spec: &LaunchSpec) -> Vec<OsString> {
        let mut lead = vec![
            "ec2",
            "run-instances",
            "--image-id",
            spec.ami_id.as_str(),
            "--count",
            "1",
            "--instance-type",
            spec.instance_type.as_str(),
            "--key-name",
            spec.key_name.as_str(),
        ];
        if let Some(ref group) = spec.security_group {
            lead.push("--security-groups");
            lead.push(group.as_str());
        }
        self.common_args(&lead)
    }

    fn launch_sync(&self, spec: &LaunchSpec) -> Result<InstanceId, ComputeError> {
        let output = self.run_checked("run-instances", self.launch_args(spec))?;
        let response: RunInstancesResponse =
            serde_json::from_str(&output.stdout).map_err(|err| ComputeError::Parse {
                operation: "run-instances",
                message: err.to_string(),
            })?;

        response
            .instances
            .into_iter()
            .next()
            .and_then(|instance| instance.instance_id)
            .filter(|id| !id.is_empty())
            .map(InstanceId::from)
            .ok_or(ComputeError::MissingInstanceId)
    }

    fn describe_sync(&self, id: &InstanceId) -> Result<InstanceStatus, ComputeError> {
        let args = self.common_args(&[
            "ec2",
            "describe-instances",
            "--instance-ids",
            id.as_str(),
        ]);
        let output = self.run_checked("describe-instances", args)?;
        let response: DescribeInstancesResponse =
            serde_json::from_str(&output.stdout).map_err(|err| ComputeError::Parse {
                operation: "describe-instances",
                message: err.to_string(),
            })?;

        Ok(status_from_response(response))
    }

    fn terminate_sync(&self, id: &InstanceId) -> Result<(), ComputeError> {
        let args = self.common_args(&[
            "ec2",
            "terminate-instances",
            "--instance-ids",
            id.as_str(),
        ]);
        self.run_checked("terminate-instances", args)?;
        Ok(())
    }
}

impl<R> ComputeClient for Ec2CliClient<R>
where
    R: CommandRunner + Send + Sync,
{
    type Error = ComputeError;

    fn launch<'a>(&'a self, spec: &'a LaunchSpec) -> ComputeFuture<'a, InstanceId, Self::Error> {
        Box::pin(async move { self.launch_sync(spec) })
    }

    fn describe_state<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> ComputeFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move { self.describe_sync(id) })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move { self.terminate_sync(id) })
    }

    fn remediation_hint(&self, id: &InstanceId) -> String {
        let mut hint = format!(
            "{} ec2 terminate-instances --instance-ids {}",
            self.aws_bin,
            id.as_str()
        );
        if let Some(ref profile) = self.profile {
            hint.push_str(" --profile ");
            hint.push_str(profile);
        }
        hint
    }
}

fn status_from_response(response: DescribeInstancesResponse) -> InstanceStatus {
    let record = response
        .reservations
        .into_iter()
        .next()
        .and_then(|reservation| reservation.instances.into_iter().next());

    record.map_or_else(
        || InstanceStatus::new(UNKNOWN_STATE, None),
        |instance| {
            let state = instance
                .state
                .and_then(|state| state.name)
                .unwrap_or_else(|| UNKNOWN_STATE.to_owned());
            InstanceStatus::new(state, instance.public_ip)
        },
    )
}

#[derive(Debug, Deserialize)]
struct RunInstancesResponse {
    #[serde(default, rename = "Instances")]
    instances: Vec<InstanceRecord>,
}

#[derive(Debug, Deserialize)]
struct DescribeInstancesResponse {
    #[serde(default, rename = "Reservations")]
    reservations: Vec<ReservationRecord>,
}

#[derive(Debug, Deserialize)]
struct ReservationRecord {
    #[serde(default, rename = "Instances")]
    instances: Vec<InstanceRecord>,
}

#[derive(Debug, Deserialize)]
struct InstanceRecord {
    #[serde(rename = "InstanceId")]
    instance_id: Option<String>,
    #[serde(rename = "State")]
    state: Option<StateRecord>,
    #[serde(rename = "PublicIpAddress")]
    public_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateRecord {
    #[serde(rename = "Name")]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn spec() -> LaunchSpec {
        LaunchSpec::builder()
            .ami_id("ami-0abc")
            .instance_type("t3.micro")
            .key_name("proxy-key")
            .security_group(Some(String::from("proxy-sg")))
            .build()
            .unwrap_or_else(|err| panic!("spec should build: {err}"))
    }

    #[tokio::test]
    async fn launch_parses_instance_id_and_forwards_profile() {
        let runner = ScriptedRunner::new();
        runner.push_success(r#"{"Instances": [{"InstanceId": "i-123"}]}"#);
        let client = Ec2CliClient::new(runner.clone(), "aws", Some(String::from("ops")));

        let id = client
            .launch(&spec())
            .await
            .unwrap_or_else(|err| panic!("launch should succeed: {err}"));
        assert_eq!(id, InstanceId::from("i-123"));

        let invocations = runner.invocations();
        let first = invocations
            .first()
            .unwrap_or_else(|| panic!("one invocation expected"));
        assert_eq!(
            first.command_string(),
            concat!(
                "aws ec2 run-instances --image-id ami-0abc --count 1 ",
                "--instance-type t3.micro --key-name proxy-key ",
                "--security-groups proxy-sg --profile ops --output json"
            )
        );
    }

    #[tokio::test]
    async fn launch_without_instance_id_is_an_error() {
        let runner = ScriptedRunner::new();
        runner.push_success(r#"{"Instances": []}"#);
        let client = Ec2CliClient::new(runner, "aws", None);

        let result = client.launch(&spec()).await;
        assert_eq!(result, Err(ComputeError::MissingInstanceId));
    }

    #[tokio::test]
    async fn launch_surfaces_cli_failure() {
        let runner = ScriptedRunner::new();
        runner.push_failure(255, "credential error");
        let client = Ec2CliClient::new(runner, "aws", None);

        let result = client.launch(&spec()).await;
        assert!(
            matches!(
                result,
                Err(ComputeError::Failed {
                    operation: "run-instances",
                    ..
                })
            ),
            "unexpected launch outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn describe_reads_state_and_address() {
        let runner = ScriptedRunner::new();
        runner.push_success(
            r#"{"Reservations": [{"Instances": [
                {"InstanceId": "i-123",
                 "State": {"Name": "running"},
                 "PublicIpAddress": "203.0.113.5"}
            ]}]}"#,
        );
        let client = Ec2CliClient::new(runner, "aws", None);

        let status = client
            .describe_state(&InstanceId::from("i-123"))
            .await
            .unwrap_or_else(|err| panic!("describe should succeed: {err}"));
        assert_eq!(
            status,
            InstanceStatus::new("running", Some(String::from("203.0.113.5")))
        );
    }

    #[tokio::test]
    async fn describe_without_record_reports_unknown_state() {
        let runner = ScriptedRunner::new();
        runner.push_success(r#"{"Reservations": []}"#);
        let client = Ec2CliClient::new(runner, "aws", None);

        let status = client
            .describe_state(&InstanceId::from("i-123"))
            .await
            .unwrap_or_else(|err| panic!("describe should succeed: {err}"));
        assert_eq!(status, InstanceStatus::new("unknown", None));
    }

    #[tokio::test]
    async fn describe_rejects_malformed_json() {
        let runner = ScriptedRunner::new();
        runner.push_success("not json");
        let client = Ec2CliClient::new(runner, "aws", None);

        let result = client.describe_state(&InstanceId::from("i-123")).await;
        assert!(
            matches!(
                result,
                Err(ComputeError::Parse {
                    operation: "describe-instances",
                    ..
                })
            ),
            "unexpected describe outcome: {result:?}"
        );
    }

    #[tokio::test]
    async fn terminate_issues_single_cli_call() {
        let runner = ScriptedRunner::new();
        runner.push_success("{}");
        let client = Ec2CliClient::new(runner.clone(), "aws", None);

        client
            .terminate(&InstanceId::from("i-789"))
            .await
            .unwrap_or_else(|err| panic!("terminate should succeed: {err}"));

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        let first = invocations
            .first()
            .unwrap_or_else(|| panic!("one invocation expected"));
        assert_eq!(
            first.command_string(),
            "aws ec2 terminate-instances --instance-ids i-789 --output json"
        );
    }

    #[test]
    fn remediation_hint_names_instance_and_profile() {
        let client = Ec2CliClient::new(ScriptedRunner::new(), "aws", Some(String::from("ops")));
        assert_eq!(
            client.remediation_hint(&InstanceId::from("i-789")),
            "aws ec2 terminate-instances --instance-ids i-789 --profile ops"
        );
    }
}
