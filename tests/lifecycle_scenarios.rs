//! End-to-end lifecycle scenarios exercised through the public API.
//!
//! Each test wires the state machine to scripted collaborators and asserts
//! the teardown guarantees an operator relies on: exactly one terminate per
//! launched instance, and none when the launch itself failed.

use std::time::Duration;

use camino::Utf8PathBuf;

use burrow::lifecycle::{LifecycleError, Outcome, ProvisioningLifecycle};
use burrow::test_support::{
    FakeCompute, FakeTunnel, RecordingProgress, ScriptedConsole,
};
use burrow::{InstanceId, InstanceStatus, LaunchSpec, TunnelPlan};

fn launch_spec() -> LaunchSpec {
    LaunchSpec::builder()
        .ami_id("ami-0abc")
        .instance_type("t3.micro")
        .key_name("proxy-key")
        .security_group(None)
        .build()
        .unwrap_or_else(|err| panic!("spec should build: {err}"))
}

fn tunnel_plan() -> TunnelPlan {
    TunnelPlan {
        local_port: 1080,
        ssh_port: 22,
        key_file: Utf8PathBuf::from("/home/op/.ssh/proxy.pem"),
        control_dir: Utf8PathBuf::from("/home/op/.burrow/ctl"),
        ssh_user: String::from("ec2-user"),
    }
}

fn lifecycle(
    compute: FakeCompute,
    tunnel: FakeTunnel,
) -> ProvisioningLifecycle<FakeCompute, FakeTunnel, RecordingProgress> {
    ProvisioningLifecycle::new(compute, tunnel, RecordingProgress::new(), 1)
        .with_tick_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn session_provisions_tunnels_and_tears_down() {
    let compute = FakeCompute::new("i-0feedbee");
    compute.push_describe(Ok(InstanceStatus::new(
        "running",
        Some(String::from("203.0.113.10")),
    )));
    let tunnel = FakeTunnel::new();
    let machine = lifecycle(compute.clone(), tunnel.clone());
    let mut console = ScriptedConsole::with_lines(["exit"]);
    let (_handle, mut token) = burrow::cancel_channel();

    let outcome = machine
        .run(&launch_spec(), &tunnel_plan(), &mut console, &mut token)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(compute.launch_calls(), 1);
    assert_eq!(compute.terminate_calls(), vec![InstanceId::from("i-0feedbee")]);
    assert_eq!(tunnel.start_calls(), 1);
    assert_eq!(tunnel.stop_calls(), 1);
}

#[tokio::test]
async fn instance_that_never_runs_is_still_terminated() {
    let compute = FakeCompute::new("i-0slowpoke");
    let tunnel = FakeTunnel::new();
    let machine = lifecycle(compute.clone(), tunnel.clone());
    let mut console = ScriptedConsole::blocking();
    let (_handle, mut token) = burrow::cancel_channel();

    let result = machine
        .run(&launch_spec(), &tunnel_plan(), &mut console, &mut token)
        .await;

    assert!(
        matches!(result, Err(LifecycleError::PollTimeout { attempts: 10 })),
        "unexpected outcome: {result:?}"
    );
    assert_eq!(compute.describe_calls(), 10);
    assert_eq!(
        compute.terminate_calls(),
        vec![InstanceId::from("i-0slowpoke")]
    );
    assert_eq!(tunnel.start_calls(), 0);
}

#[tokio::test]
async fn failed_launch_creates_nothing_to_tear_down() {
    let compute = FakeCompute::new("i-unused");
    compute.fail_launch("quota exceeded");
    let tunnel = FakeTunnel::new();
    let machine = lifecycle(compute.clone(), tunnel.clone());
    let mut console = ScriptedConsole::blocking();
    let (_handle, mut token) = burrow::cancel_channel();

    let result = machine
        .run(&launch_spec(), &tunnel_plan(), &mut console, &mut token)
        .await;

    assert!(
        matches!(result, Err(LifecycleError::Launch(_))),
        "unexpected outcome: {result:?}"
    );
    assert!(compute.terminate_calls().is_empty());
    assert_eq!(tunnel.start_calls(), 0);
}

#[tokio::test]
async fn failed_terminate_surfaces_the_manual_command() {
    let compute = FakeCompute::new("i-0stuck");
    compute.push_describe(Ok(InstanceStatus::new(
        "running",
        Some(String::from("203.0.113.11")),
    )));
    compute.fail_terminate("api unavailable");
    let tunnel = FakeTunnel::new();
    let machine = lifecycle(compute.clone(), tunnel.clone());
    let mut console = ScriptedConsole::with_lines(["exit"]);
    let (_handle, mut token) = burrow::cancel_channel();

    let result = machine
        .run(&launch_spec(), &tunnel_plan(), &mut console, &mut token)
        .await;

    match result {
        Err(LifecycleError::Teardown {
            instance_id,
            remediation,
            ..
        }) => {
            assert_eq!(instance_id, InstanceId::from("i-0stuck"));
            assert!(
                remediation.contains("i-0stuck"),
                "remediation should name the instance: {remediation}"
            );
        }
        other => panic!("expected a teardown failure, got {other:?}"),
    }
    assert_eq!(tunnel.stop_calls(), 1);
}
