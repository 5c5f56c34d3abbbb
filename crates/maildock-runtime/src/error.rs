//! Error types for maildock-runtime

use thiserror::Error;

/// Errors that can occur while driving the container runtime CLI
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Runtime binary not found
    #[error("container runtime is not installed or not in PATH")]
    RuntimeNotFound,

    /// Runtime command exceeded its time budget
    #[error("runtime command timed out after {0} seconds")]
    Timeout(u64),

    /// Runtime command exited non-zero
    #[error("runtime command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Container does not exist
    #[error("no such container: {0}")]
    NoSuchContainer(String),

    /// Network does not exist
    #[error("no such network: {0}")]
    NoSuchNetwork(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
