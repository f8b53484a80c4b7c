//! Configuration loading via `ortho-config`.
//!
//! Settings merge defaults, configuration files (global `burrow.toml` and a
//! local `.burrow.toml`), and `BURROW_`-prefixed environment variables.
//! Command-line flags are applied on top by the binary, so the lifecycle
//! always receives one immutable, fully validated [`Settings`] value and
//! never reads the ambient process environment itself.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::compute::LaunchSpec;
use crate::paths::expand_tilde;
use crate::tunnel::{DEFAULT_SSH_PORT, TunnelPlan};

/// Resolved settings for one provisioning run.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BURROW",
    discovery(
        app_name = "burrow",
        env_var = "BURROW_CONFIG_PATH",
        config_file_name = "burrow.toml",
        dotfile_name = ".burrow.toml",
        project_file_name = "burrow.toml"
    )
)]
pub struct Settings {
    /// Machine image to boot the instance from. Required.
    #[ortho_config(default = String::new())]
    pub ami_id: String,
    /// Instance type (commercial flavour) to request.
    #[ortho_config(default = "t3.micro".to_owned())]
    pub instance_type: String,
    /// Optional security group applied to the instance.
    pub security_group: Option<String>,
    /// Name of the provider-registered key pair to launch with. Required.
    #[ortho_config(default = String::new())]
    pub key_name: String,
    /// Private key file used to authenticate the tunnel. Required. Supports
    /// tilde expansion (`~/.ssh/proxy.pem`).
    #[ortho_config(default = String::new())]
    pub key_file: String,
    /// Directory holding tunnel control sockets. Created with mode 0700
    /// before provisioning starts.
    #[ortho_config(default = "~/.burrow/ctl".to_owned())]
    pub control_dir: String,
    /// Local port the SOCKS5 proxy listens on.
    #[ortho_config(default = 1080)]
    pub local_port: u16,
    /// Seconds to pause between instance state polls.
    #[ortho_config(default = 3)]
    pub poll_wait_seconds: u64,
    /// Named credential profile passed to the provider CLI. Absent means
    /// the provider's default resolution.
    pub profile: Option<String>,
    /// Remote user the tunnel connects as.
    #[ortho_config(default = "ec2-user".to_owned())]
    pub ssh_user: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the provider CLI executable.
    #[ortho_config(default = "aws".to_owned())]
    pub aws_bin: String,
    /// Whether verbose diagnostics are enabled.
    #[ortho_config(default = false)]
    pub verbose: bool,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    flag: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        flag: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            flag,
            env_var,
            toml_key,
        }
    }
}

impl Settings {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: pass {}, set {}, or add {} to burrow.toml",
                metadata.description, metadata.flag, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments.
    /// Values merge defaults, configuration files, and environment
    /// variables; flags are layered on by the caller afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("burrow")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values via flags,
    /// environment variables, or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required field is empty or a numeric
    /// field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.ami_id,
            &FieldMetadata::new("machine image id", "-a", "BURROW_AMI_ID", "ami_id"),
        )?;
        Self::require_field(
            &self.key_name,
            &FieldMetadata::new("key pair name", "-k", "BURROW_KEY_NAME", "key_name"),
        )?;
        Self::require_field(
            &self.key_file,
            &FieldMetadata::new("private key file", "-f", "BURROW_KEY_FILE", "key_file"),
        )?;
        Self::require_field(
            &self.control_dir,
            &FieldMetadata::new(
                "control socket directory",
                "-d",
                "BURROW_CONTROL_DIR",
                "control_dir",
            ),
        )?;
        Self::require_field(
            &self.instance_type,
            &FieldMetadata::new(
                "instance type",
                "-t",
                "BURROW_INSTANCE_TYPE",
                "instance_type",
            ),
        )?;
        if self.ssh_user.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "ssh_user must not be empty",
            )));
        }
        if self.local_port == 0 {
            return Err(ConfigError::Invalid(String::from(
                "local_port must be non-zero",
            )));
        }
        if self.poll_wait_seconds == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_wait_seconds must be at least 1",
            )));
        }
        Ok(())
    }

    /// Builds a [`LaunchSpec`] from the validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn launch_spec(&self) -> Result<LaunchSpec, ConfigError> {
        self.validate()?;
        LaunchSpec::builder()
            .ami_id(&self.ami_id)
            .instance_type(&self.instance_type)
            .key_name(&self.key_name)
            .security_group(self.security_group.clone())
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Builds the tunnel plan, expanding tilde prefixes in paths.
    #[must_use]
    pub fn tunnel_plan(&self) -> TunnelPlan {
        TunnelPlan {
            local_port: self.local_port,
            ssh_port: DEFAULT_SSH_PORT,
            key_file: Utf8PathBuf::from(expand_tilde(&self.key_file)),
            control_dir: self.control_dir_path(),
            ssh_user: self.ssh_user.clone(),
        }
    }

    /// Returns the control directory with tilde expansion applied.
    #[must_use]
    pub fn control_dir_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(&self.control_dir))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a present field carries an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn settings() -> Settings {
        Settings {
            ami_id: String::from("ami-0abc"),
            instance_type: String::from("t3.micro"),
            security_group: Some(String::from("proxy-sg")),
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
    fn validate_accepts_complete_settings() {
        assert_eq!(settings().validate(), Ok(()));
    }

    #[rstest]
    #[case::ami_id(Settings { ami_id: String::new(), ..settings() }, "BURROW_AMI_ID")]
    #[case::key_name(Settings { key_name: String::new(), ..settings() }, "BURROW_KEY_NAME")]
    #[case::key_file(Settings { key_file: String::from("  "), ..settings() }, "BURROW_KEY_FILE")]
    #[case::control_dir(
        Settings { control_dir: String::new(), ..settings() },
        "BURROW_CONTROL_DIR"
    )]
    fn validate_rejects_missing_fields(#[case] candidate: Settings, #[case] hint: &str) {
        let error = candidate
            .validate()
            .expect_err("validation should fail");
        assert!(
            matches!(error, ConfigError::MissingField(ref message) if message.contains(hint)),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn validate_rejects_zero_local_port() {
        let candidate = Settings {
            local_port: 0,
            ..settings()
        };
        assert!(matches!(candidate.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_poll_wait() {
        let candidate = Settings {
            poll_wait_seconds: 0,
            ..settings()
        };
        assert!(matches!(candidate.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn launch_spec_copies_instance_parameters() {
        let spec = settings()
            .launch_spec()
            .unwrap_or_else(|err| panic!("spec should build: {err}"));
        assert_eq!(spec.ami_id, "ami-0abc");
        assert_eq!(spec.instance_type, "t3.micro");
        assert_eq!(spec.key_name, "proxy-key");
        assert_eq!(spec.security_group, Some(String::from("proxy-sg")));
    }

    #[test]
    fn tunnel_plan_uses_default_ssh_port() {
        let plan = settings().tunnel_plan();
        assert_eq!(plan.ssh_port, 22);
        assert_eq!(plan.local_port, 1080);
        assert_eq!(plan.ssh_user, "ec2-user");
        assert_eq!(plan.control_dir, Utf8PathBuf::from("/home/op/.burrow/ctl"));
    }
}
