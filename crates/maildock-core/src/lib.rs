//! Maildock Core Library
//!
//! Configuration, deployment plan, and error taxonomy for the maildock
//! sequencer. The deployable stack is declared here as data
//! ([`plan::mail_stack_plan`]); the sequencing itself lives in
//! `maildock-deploy`.

pub mod config;
pub mod error;
pub mod labels;
pub mod obs;
pub mod plan;

pub use config::{DeployConfig, EnvFile, ForwardAuthConfig, ProxyNetworkPolicy, SECRET_KEY_LEN};
pub use error::{ConfigError, DeployError, Result};
pub use obs::{
    emit_deploy_finished, emit_deploy_started, emit_prepare_warning, emit_service_ready,
    emit_service_started, init_tracing, DeploySpan,
};
pub use plan::{
    mail_stack_plan, DeployPlan, MountSpec, NetworkSpec, ProbeSpec, ServiceSpec, DATA_SUBDIRS,
};

pub use maildock_runtime::{ContainerRuntime, DockerCli, ExecOutput, RunRequest, RuntimeError};

/// Maildock version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
