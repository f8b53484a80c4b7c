//! Compute-provider abstraction for the instance lifecycle.
//!
//! The provisioning state machine only depends on the narrow contract
//! defined here: launch one instance, poll its state, terminate it. The
//! production implementation drives the provider CLI as a subprocess; tests
//! substitute fakes that simulate delayed-ready, permanently-pending, and
//! failing control planes.

mod ec2;
mod error;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

pub use ec2::Ec2CliClient;
pub use error::ComputeError;

/// Provider-assigned identifier for a launched instance.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps a raw identifier string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Point-in-time view of an instance as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Raw lifecycle state string (for example `pending` or `running`).
    pub state: String,
    /// Public network address, absent until the instance is reachable.
    pub public_address: Option<String>,
}

impl InstanceStatus {
    /// Builds a status from a state string and optional address.
    #[must_use]
    pub fn new(state: impl Into<String>, public_address: Option<String>) -> Self {
        Self {
            state: state.into(),
            public_address,
        }
    }
}

/// Parameters required to launch a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    /// Machine image identifier to boot from.
    pub ami_id: String,
    /// Instance type (commercial flavour) to request.
    pub instance_type: String,
    /// Name of the provider-registered key pair.
    pub key_name: String,
    /// Optional security group applied to the instance.
    pub security_group: Option<String>,
}

impl LaunchSpec {
    /// Starts a builder for a [`LaunchSpec`].
    #[must_use]
    pub fn builder() -> LaunchSpecBuilder {
        LaunchSpecBuilder::default()
    }

    /// Validates the spec, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchSpecError`] when any required string field is empty.
    pub fn validate(&self) -> Result<(), LaunchSpecError> {
        if self.ami_id.is_empty() {
            return Err(LaunchSpecError::MissingField("ami_id".to_owned()));
        }
        if self.instance_type.is_empty() {
            return Err(LaunchSpecError::MissingField("instance_type".to_owned()));
        }
        if self.key_name.is_empty() {
            return Err(LaunchSpecError::MissingField("key_name".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`LaunchSpec`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LaunchSpecBuilder {
    ami_id: String,
    instance_type: String,
    key_name: String,
    security_group: Option<String>,
}

impl LaunchSpecBuilder {
    /// Sets the machine image identifier.
    #[must_use]
    pub fn ami_id(mut self, value: impl Into<String>) -> Self {
        self.ami_id = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the key pair name.
    #[must_use]
    pub fn key_name(mut self, value: impl Into<String>) -> Self {
        self.key_name = value.into();
        self
    }

    /// Sets the optional security group.
    #[must_use]
    pub fn security_group(mut self, value: Option<String>) -> Self {
        self.security_group = value;
        self
    }

    /// Builds and validates the [`LaunchSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchSpecError`] when any required field is empty.
    pub fn build(self) -> Result<LaunchSpec, LaunchSpecError> {
        let spec = LaunchSpec {
            ami_id: self.ami_id.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            key_name: self.key_name.trim().to_owned(),
            security_group: self.security_group.map(|value| value.trim().to_owned()),
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Errors raised while constructing a [`LaunchSpec`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LaunchSpecError {
    /// Raised when a required field is missing or empty.
    #[error("missing or empty field: {0}")]
    MissingField(String),
}

/// Future returned by compute client operations.
pub type ComputeFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by compute control planes.
pub trait ComputeClient {
    /// Provider specific error type returned by the client.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Launches exactly one instance and returns its identifier.
    fn launch<'a>(&'a self, spec: &'a LaunchSpec) -> ComputeFuture<'a, InstanceId, Self::Error>;

    /// Queries the current lifecycle state of an instance.
    fn describe_state<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> ComputeFuture<'a, InstanceStatus, Self::Error>;

    /// Requests termination of an instance.
    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ComputeFuture<'a, (), Self::Error>;

    /// Returns the exact command an operator should run by hand if automated
    /// termination fails.
    fn remediation_hint(&self, id: &InstanceId) -> String;
}
