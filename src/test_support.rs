//! Test support utilities shared across unit and integration tests.
//!
//! Provides scripted doubles for every external collaborator: the command
//! runner, the compute control plane, the tunnel transport, the operator
//! console, and the progress observer. All doubles are `Send + Sync` so
//! they satisfy the boxed-future bounds of the production traits.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::command::{CommandOutput, CommandRunner, SpawnError};
use crate::compute::{ComputeClient, ComputeFuture, InstanceId, InstanceStatus, LaunchSpec};
use crate::console::{Console, ConsoleFuture};
use crate::progress::ProgressObserver;
use crate::tunnel::{TunnelFuture, TunnelProcess, TunnelSpec};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Error type shared by the scripted collaborator doubles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct FakeFailure(pub String);

impl FakeFailure {
    /// Builds a failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a successful response with the given stdout.
    pub fn push_success(&self, stdout: &str) {
        self.push_output(CommandOutput {
            code: Some(0),
            stdout: stdout.to_owned(),
            stderr: String::new(),
        });
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: &str) {
        self.push_output(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_owned(),
        });
    }

    /// Pushes an explicit command output response.
    pub fn push_output(&self, output: CommandOutput) {
        lock(&self.responses).push_back(output);
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses).pop_front().ok_or_else(|| SpawnError {
            program: program.to_owned(),
            message: String::from("no scripted response queued"),
        })
    }
}

#[derive(Debug)]
struct FakeComputeInner {
    launch_result: Result<InstanceId, FakeFailure>,
    describe_queue: VecDeque<Result<InstanceStatus, FakeFailure>>,
    describe_default: Result<InstanceStatus, FakeFailure>,
    terminate_result: Result<(), FakeFailure>,
    launch_calls: u32,
    describe_calls: u32,
    terminate_calls: Vec<InstanceId>,
}

/// Scripted compute control plane.
///
/// Launch, describe, and terminate outcomes are seeded up front; describe
/// responses drain a FIFO queue and fall back to a default, which makes
/// permanently-pending and delayed-ready backends easy to express.
#[derive(Clone, Debug)]
pub struct FakeCompute {
    inner: Arc<Mutex<FakeComputeInner>>,
}

impl FakeCompute {
    /// Creates a fake that launches `instance_id` and reports `pending`
    /// forever.
    #[must_use]
    pub fn new(instance_id: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeComputeInner {
                launch_result: Ok(InstanceId::from(instance_id)),
                describe_queue: VecDeque::new(),
                describe_default: Ok(InstanceStatus::new("pending", None)),
                terminate_result: Ok(()),
                launch_calls: 0,
                describe_calls: 0,
                terminate_calls: Vec::new(),
            })),
        }
    }

    /// Makes the launch request fail.
    pub fn fail_launch(&self, message: &str) {
        lock(&self.inner).launch_result = Err(FakeFailure::new(message));
    }

    /// Queues one describe response.
    pub fn push_describe(&self, result: Result<InstanceStatus, FakeFailure>) {
        lock(&self.inner).describe_queue.push_back(result);
    }

    /// Sets the describe response used once the queue is drained.
    pub fn set_describe_default(&self, result: Result<InstanceStatus, FakeFailure>) {
        lock(&self.inner).describe_default = result;
    }

    /// Makes the terminate request fail.
    pub fn fail_terminate(&self, message: &str) {
        lock(&self.inner).terminate_result = Err(FakeFailure::new(message));
    }

    /// Number of launch requests issued.
    #[must_use]
    pub fn launch_calls(&self) -> u32 {
        lock(&self.inner).launch_calls
    }

    /// Number of describe requests issued.
    #[must_use]
    pub fn describe_calls(&self) -> u32 {
        lock(&self.inner).describe_calls
    }

    /// Instance identifiers passed to terminate, in call order.
    #[must_use]
    pub fn terminate_calls(&self) -> Vec<InstanceId> {
        lock(&self.inner).terminate_calls.clone()
    }
}

impl ComputeClient for FakeCompute {
    type Error = FakeFailure;

    fn launch<'a>(&'a self, _spec: &'a LaunchSpec) -> ComputeFuture<'a, InstanceId, Self::Error> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            inner.launch_calls += 1;
            inner.launch_result.clone()
        })
    }

    fn describe_state<'a>(
        &'a self,
        _id: &'a InstanceId,
    ) -> ComputeFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            inner.describe_calls += 1;
            inner
                .describe_queue
                .pop_front()
                .unwrap_or_else(|| inner.describe_default.clone())
        })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            inner.terminate_calls.push(id.clone());
            inner.terminate_result.clone()
        })
    }

    fn remediation_hint(&self, id: &InstanceId) -> String {
        format!("terminate {id} by hand")
    }
}

#[derive(Debug)]
struct FakeTunnelInner {
    start_queue: VecDeque<Result<(), FakeFailure>>,
    start_default: Result<(), FakeFailure>,
    stop_result: Result<(), FakeFailure>,
    start_calls: u32,
    stop_calls: u32,
    started_specs: Vec<TunnelSpec>,
}

/// Scripted tunnel transport.
#[derive(Clone, Debug)]
pub struct FakeTunnel {
    inner: Arc<Mutex<FakeTunnelInner>>,
}

impl FakeTunnel {
    /// Creates a fake whose start and stop requests succeed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeTunnelInner {
                start_queue: VecDeque::new(),
                start_default: Ok(()),
                stop_result: Ok(()),
                start_calls: 0,
                stop_calls: 0,
                started_specs: Vec::new(),
            })),
        }
    }

    /// Queues one start response ahead of the default.
    pub fn push_start(&self, result: Result<(), FakeFailure>) {
        lock(&self.inner).start_queue.push_back(result);
    }

    /// Sets the start response used once the queue is drained.
    pub fn set_start_default(&self, result: Result<(), FakeFailure>) {
        lock(&self.inner).start_default = result;
    }

    /// Makes the stop request fail.
    pub fn fail_stop(&self, message: &str) {
        lock(&self.inner).stop_result = Err(FakeFailure::new(message));
    }

    /// Number of start requests issued.
    #[must_use]
    pub fn start_calls(&self) -> u32 {
        lock(&self.inner).start_calls
    }

    /// Number of stop requests issued.
    #[must_use]
    pub fn stop_calls(&self) -> u32 {
        lock(&self.inner).stop_calls
    }

    /// Specs passed to start, in call order.
    #[must_use]
    pub fn started_specs(&self) -> Vec<TunnelSpec> {
        lock(&self.inner).started_specs.clone()
    }
}

impl Default for FakeTunnel {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelProcess for FakeTunnel {
    type Error = FakeFailure;

    fn start<'a>(&'a self, spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            inner.start_calls += 1;
            inner.started_specs.push(spec.clone());
            inner
                .start_queue
                .pop_front()
                .unwrap_or_else(|| inner.start_default.clone())
        })
    }

    fn stop<'a>(&'a self, _spec: &'a TunnelSpec) -> TunnelFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut inner = lock(&self.inner);
            inner.stop_calls += 1;
            inner.stop_result.clone()
        })
    }
}

/// Scripted operator console.
#[derive(Clone, Debug)]
pub struct ScriptedConsole {
    lines: Arc<Mutex<VecDeque<String>>>,
    block_when_empty: bool,
}

impl ScriptedConsole {
    /// Creates a console that yields `lines` then reports end of input.
    #[must_use]
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Arc::new(Mutex::new(lines.into_iter().map(Into::into).collect())),
            block_when_empty: false,
        }
    }

    /// Creates a console that blocks forever, as an idle operator would.
    #[must_use]
    pub fn blocking() -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::new())),
            block_when_empty: true,
        }
    }
}

impl Console for ScriptedConsole {
    fn read_command(&mut self) -> ConsoleFuture<'_, Option<String>> {
        Box::pin(async move {
            let next = lock(&self.lines).pop_front();
            match next {
                Some(line) => Ok(Some(line)),
                None if self.block_when_empty => pending().await,
                None => Ok(None),
            }
        })
    }
}

/// Progress observer that records every indicator it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    ticks: Arc<Mutex<Vec<char>>>,
}

impl RecordingProgress {
    /// Creates an observer with an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded indicators in emission order.
    #[must_use]
    pub fn ticks(&self) -> Vec<char> {
        lock(&self.ticks).clone()
    }
}

impl ProgressObserver for RecordingProgress {
    fn tick(&self, indicator: char) {
        lock(&self.ticks).push(indicator);
    }
}
