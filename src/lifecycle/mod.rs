//! Provisioning-and-lifecycle state machine.
//!
//! Orchestrates the compute client and tunnel transport through
//! launch → wait-for-running → connect-tunnel → supervise → teardown.
//! Every network-dependent step runs under a bounded attempt budget, and
//! teardown of the billable instance is attempted on every exit path once a
//! launch has produced an instance identifier.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::compute::{ComputeClient, InstanceId, LaunchSpec};
use crate::console::Console;
use crate::progress::ProgressObserver;
use crate::tunnel::{TunnelPlan, TunnelProcess, TunnelSpec};

/// Literal state token that marks an instance ready for tunnelling. Any
/// other value, including transient provider states, counts as not ready.
const RUNNING_STATE: &str = "running";

/// Exit command recognised during the supervised session.
const EXIT_COMMAND: &str = "exit";

/// Indicator emitted while waiting between tunnel attempts.
const TUNNEL_INDICATOR: char = '.';

/// Maximum number of state polls before declaring a timeout.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;

/// Total tunnel start attempts: one initial try plus ten retries.
pub const DEFAULT_TUNNEL_ATTEMPTS: u32 = 11;

/// How a completed lifecycle run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The operator ended the session normally.
    Completed,
    /// A cancellation signal ended the session; teardown still ran.
    Cancelled,
}

/// Errors surfaced by the lifecycle state machine.
///
/// Every variant except [`LifecycleError::Launch`] is produced after a
/// teardown attempt; a failed terminate call supersedes the in-flight error
/// as [`LifecycleError::Teardown`].
#[derive(Debug, Error)]
pub enum LifecycleError<CE, TE>
where
    CE: std::error::Error + 'static,
    TE: std::error::Error + 'static,
{
    /// Raised when the launch request fails or yields no usable identifier.
    #[error("failed to launch instance: {0}")]
    Launch(#[source] CE),
    /// Raised when a state poll cannot reach the provider. Transport
    /// failures are fatal on first occurrence, unlike not-ready states.
    #[error("state poll attempt {attempt} failed: {source}")]
    Poll {
        /// Poll attempt (1-based) that failed.
        attempt: u32,
        /// Underlying provider error.
        #[source]
        source: CE,
    },
    /// Raised when the poll budget is exhausted without seeing `running`.
    #[error("instance did not reach running within {attempts} poll attempts")]
    PollTimeout {
        /// Number of polls issued before giving up.
        attempts: u32,
    },
    /// Raised when a running instance reports no public address.
    #[error("instance {instance_id} is running but has no public address")]
    MissingAddress {
        /// Identifier of the unusable instance.
        instance_id: InstanceId,
    },
    /// Raised when every tunnel start attempt failed.
    #[error("tunnel did not connect after {attempts} attempts: {source}")]
    Connect {
        /// Total start attempts issued.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: TE,
    },
    /// Raised when the terminate request itself fails. The instance may
    /// still be running and billing; the remediation command must be shown
    /// to the operator.
    #[error("failed to terminate instance {instance_id}: {source}")]
    Teardown {
        /// Identifier of the instance that may still be running.
        instance_id: InstanceId,
        /// Exact command the operator should run by hand.
        remediation: String,
        /// Underlying provider error.
        #[source]
        source: CE,
    },
}

/// Per-run mutable state owned exclusively by the lifecycle.
#[derive(Debug)]
struct Session {
    instance_id: InstanceId,
    tunnel: Option<TunnelSpec>,
    terminated: bool,
}

impl Session {
    const fn new(instance_id: InstanceId) -> Self {
        Self {
            instance_id,
            tunnel: None,
            terminated: false,
        }
    }
}

/// Result of a cancellable phase.
enum Step<T> {
    Done(T),
    Cancelled,
}

/// Drives one provision–tunnel–teardown run.
#[derive(Debug)]
pub struct ProvisioningLifecycle<C, T, O>
where
    C: ComputeClient,
    T: TunnelProcess,
    O: ProgressObserver,
{
    compute: C,
    tunnel: T,
    observer: O,
    poll_wait_ticks: u64,
    tick_interval: Duration,
    poll_attempts: u32,
    tunnel_attempts: u32,
}

impl<C, T, O> ProvisioningLifecycle<C, T, O>
where
    C: ComputeClient,
    T: TunnelProcess,
    O: ProgressObserver,
{
    /// Creates a lifecycle with default attempt budgets.
    ///
    /// `poll_wait_seconds` is the inter-attempt delay; one progress tick is
    /// emitted per second of it.
    #[must_use]
    pub const fn new(compute: C, tunnel: T, observer: O, poll_wait_seconds: u64) -> Self {
        Self {
            compute,
            tunnel,
            observer,
            poll_wait_ticks: poll_wait_seconds,
            tick_interval: Duration::from_secs(1),
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            tunnel_attempts: DEFAULT_TUNNEL_ATTEMPTS,
        }
    }

    /// Overrides the poll attempt budget.
    #[must_use]
    pub const fn with_poll_attempts(mut self, attempts: u32) -> Self {
        self.poll_attempts = attempts;
        self
    }

    /// Overrides the total tunnel attempt budget.
    #[must_use]
    pub const fn with_tunnel_attempts(mut self, attempts: u32) -> Self {
        self.tunnel_attempts = attempts;
        self
    }

    /// Overrides the tick interval.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs the full lifecycle.
    ///
    /// Once a launch has produced an instance identifier, every path out of
    /// this function attempts exactly one terminate call for it.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when provisioning, polling, tunnel
    /// establishment, or teardown fail.
    pub async fn run<S: Console>(
        &self,
        launch: &LaunchSpec,
        plan: &TunnelPlan,
        console: &mut S,
        cancel: &mut CancelToken,
    ) -> Result<Outcome, LifecycleError<C::Error, T::Error>> {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let instance_id = self
            .compute
            .launch(launch)
            .await
            .map_err(LifecycleError::Launch)?;
        info!(instance_id = %instance_id, "instance launched");
        let mut session = Session::new(instance_id);

        let address = match self.wait_for_running(&mut session, cancel).await? {
            Step::Done(address) => address,
            Step::Cancelled => return self.finish_cancelled(&mut session).await,
        };
        info!(address = %address, "instance running");

        match self
            .connect_tunnel(&mut session, plan, &address, cancel)
            .await?
        {
            Step::Done(()) => {}
            Step::Cancelled => return self.finish_cancelled(&mut session).await,
        }
        info!(local_port = plan.local_port, "tunnel established");

        match self.supervise(console, cancel).await {
            Step::Done(()) => {
                self.teardown(&mut session).await?;
                Ok(Outcome::Completed)
            }
            Step::Cancelled => self.finish_cancelled(&mut session).await,
        }
    }

    /// Polls the instance state under the attempt budget.
    async fn wait_for_running(
        &self,
        session: &mut Session,
        cancel: &mut CancelToken,
    ) -> Result<Step<String>, LifecycleError<C::Error, T::Error>> {
        for attempt in 1..=self.poll_attempts {
            if cancel.is_cancelled() {
                return Ok(Step::Cancelled);
            }

            let status = match self.compute.describe_state(&session.instance_id).await {
                Ok(status) => status,
                Err(source) => {
                    // A transport failure leaves the provider-side state
                    // unknown; tear down immediately rather than retry blind.
                    self.teardown(session).await?;
                    return Err(LifecycleError::Poll { attempt, source });
                }
            };
            debug!(attempt, state = %status.state, "instance state polled");

            if status.state == RUNNING_STATE {
                return match status.public_address {
                    Some(address) if !address.is_empty() => Ok(Step::Done(address)),
                    _ => {
                        self.teardown(session).await?;
                        Err(LifecycleError::MissingAddress {
                            instance_id: session.instance_id.clone(),
                        })
                    }
                };
            }

            let indicator = status.state.chars().next().unwrap_or('?');
            if self.delay(indicator, cancel).await {
                return Ok(Step::Cancelled);
            }
        }

        self.teardown(session).await?;
        Err(LifecycleError::PollTimeout {
            attempts: self.poll_attempts,
        })
    }

    /// Starts the tunnel, retrying under the attempt budget.
    async fn connect_tunnel(
        &self,
        session: &mut Session,
        plan: &TunnelPlan,
        address: &str,
        cancel: &mut CancelToken,
    ) -> Result<Step<()>, LifecycleError<C::Error, T::Error>> {
        let spec = plan.spec_for(address);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Ok(Step::Cancelled);
            }

            match self.tunnel.start(&spec).await {
                Ok(()) => {
                    session.tunnel = Some(spec);
                    return Ok(Step::Done(()));
                }
                Err(source) if attempt >= self.tunnel_attempts => {
                    self.teardown(session).await?;
                    return Err(LifecycleError::Connect {
                        attempts: attempt,
                        source,
                    });
                }
                Err(source) => warn!(attempt, error = %source, "tunnel start failed"),
            }

            if self.delay(TUNNEL_INDICATOR, cancel).await {
                return Ok(Step::Cancelled);
            }
        }
    }

    /// Blocks on operator input until the exit command, end of input, or
    /// cancellation.
    async fn supervise<S: Console>(&self, console: &mut S, cancel: &mut CancelToken) -> Step<()> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Step::Cancelled,
                line = console.read_command() => match line {
                    Ok(Some(command)) if command == EXIT_COMMAND => return Step::Done(()),
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        info!("input closed; ending session");
                        return Step::Done(());
                    }
                    Err(error) => {
                        warn!(error = %error, "console read failed; ending session");
                        return Step::Done(());
                    }
                },
            }
        }
    }

    async fn finish_cancelled(
        &self,
        session: &mut Session,
    ) -> Result<Outcome, LifecycleError<C::Error, T::Error>> {
        info!("cancellation requested; tearing down");
        self.teardown(session).await?;
        Ok(Outcome::Cancelled)
    }

    /// Closes the tunnel (best-effort) then terminates the instance.
    ///
    /// Exactly one terminate request is ever issued per session, no matter
    /// how many times teardown runs.
    async fn teardown(
        &self,
        session: &mut Session,
    ) -> Result<(), LifecycleError<C::Error, T::Error>> {
        if let Some(spec) = session.tunnel.take()
            && let Err(error) = self.tunnel.stop(&spec).await
        {
            warn!(error = %error, "tunnel close failed; continuing with terminate");
        }

        if session.terminated {
            return Ok(());
        }
        session.terminated = true;

        let instance_id = session.instance_id.clone();
        info!(instance_id = %instance_id, "terminating instance");
        self.compute
            .terminate(&instance_id)
            .await
            .map_err(|source| LifecycleError::Teardown {
                remediation: self.compute.remediation_hint(&instance_id),
                instance_id,
                source,
            })
    }

    /// Sleeps for the configured wait, emitting one indicator per tick.
    /// Returns `true` when cancellation interrupted the wait.
    async fn delay(&self, indicator: char, cancel: &mut CancelToken) -> bool {
        for _ in 0..self.poll_wait_ticks {
            tokio::select! {
                () = cancel.cancelled() => return true,
                () = sleep(self.tick_interval) => self.observer.tick(indicator),
            }
        }
        false
    }
}
