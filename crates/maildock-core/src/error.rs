//! Error taxonomy for the deployment sequencer.

use std::path::PathBuf;

use maildock_runtime::RuntimeError;

/// Errors produced while loading or validating the deployment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("required configuration key is missing or empty: {0}")]
    MissingKey(String),

    #[error("secret key must be exactly {expected} characters, got {actual}")]
    SecretLength { expected: usize, actual: usize },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maildock deployment errors.
///
/// Every variant is fatal: the sequencer aborts with a non-zero exit status
/// as soon as one surfaces. Warning-grade conditions (ownership fix,
/// root-hints download) never become errors.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("container runtime is not installed or not responding")]
    RuntimeUnavailable,

    #[error("image pull failed for {image}: {detail}")]
    Pull { image: String, detail: String },

    #[error("required network does not exist: {0}")]
    NetworkPrerequisite(String),

    #[error("service {service} was not ready after {ticks} polling attempts")]
    ReadinessTimeout {
        service: String,
        ticks: u64,
        last_logs: String,
    },

    #[error("containers not running after deploy: {}", .names.join(", "))]
    PostDeployDrift { names: Vec<String> },

    #[error("service {service} depends on unknown service {dependency}")]
    UnknownDependency { service: String, dependency: String },

    #[error("dependency cycle involving service {0}")]
    DependencyCycle(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for maildock deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;
