//! Docker CLI implementation of [`ContainerRuntime`]
//!
//! Every operation spawns the `docker` binary as a child process with an
//! overall time budget, captures stdout/stderr, and translates non-zero
//! exits into [`RuntimeError::CommandFailed`]. Nothing is cached: the CLI
//! is consulted fresh for every question, matching the engine's own view.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::RuntimeError;
use crate::{ContainerRuntime, ExecOutput, Result, RunRequest};

/// Tokens the CLI emits when a named object is already gone.
const ABSENT_MARKERS: [&str; 3] = ["No such container", "No such network", "not found"];

/// Container runtime backed by the `docker` command-line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Client for the `docker` binary on PATH with a 300s per-command budget
    /// (image pulls are the slow path).
    pub fn new() -> Self {
        DockerCli {
            binary: "docker".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Use an alternative binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }

    /// Override the per-command time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn one CLI invocation and capture its output.
    async fn invoke(&self, args: &[&str]) -> Result<ExecOutput> {
        debug!(command = %format!("{} {}", self.binary, args.join(" ")), "runtime invocation");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary).args(args).output(),
        )
        .await
        .map_err(|_| RuntimeError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::RuntimeNotFound
            } else {
                RuntimeError::Io(e)
            }
        })?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Invoke and require a zero exit, naming the operation in the error.
    async fn invoke_checked(&self, args: &[&str]) -> Result<ExecOutput> {
        let output = self.invoke(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                command: args.join(" "),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Whether a failure message means "the object was already absent".
    fn is_absent(stderr: &str) -> bool {
        ABSENT_MARKERS.iter().any(|marker| stderr.contains(marker))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn version(&self) -> Result<String> {
        let output = self
            .invoke(&["version", "--format", "{{.Server.Version}}"])
            .await?;
        if output.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(RuntimeError::RuntimeNotFound)
        }
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let output = self.invoke(&["network", "inspect", name]).await?;
        Ok(output.success())
    }

    async fn create_network(&self, name: &str, subnet: Option<&str>) -> Result<()> {
        let mut args = vec!["network", "create"];
        if let Some(subnet) = subnet {
            args.push("--subnet");
            args.push(subnet);
        }
        args.push(name);
        self.invoke_checked(&args).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let output = self.invoke(&["network", "rm", name]).await?;
        if output.success() || Self::is_absent(&output.stderr) {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("network rm {}", name),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        self.invoke_checked(&["network", "connect", network, container])
            .await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.invoke_checked(&["pull", image]).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let output = self.invoke(&["rm", "-f", name]).await?;
        if output.success() || Self::is_absent(&output.stderr) {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("rm -f {}", name),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    async fn run_container(&self, request: &RunRequest) -> Result<()> {
        let args = request.to_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.invoke_checked(&arg_refs).await?;
        Ok(())
    }

    async fn container_running(&self, name: &str) -> Result<bool> {
        let output = self
            .invoke(&["inspect", "--format", "{{.State.Running}}", name])
            .await?;
        if !output.success() {
            // Unknown name means "not running" for the final status snapshot.
            return Ok(false);
        }
        Ok(output.stdout.trim() == "true")
    }

    async fn container_logs(&self, name: &str, tail: usize) -> Result<String> {
        let tail = tail.to_string();
        let output = self.invoke(&["logs", "--tail", &tail, name]).await?;
        if !output.success() {
            return Err(RuntimeError::NoSuchContainer(name.to_string()));
        }
        // The engine splits container output across both streams.
        let mut combined = output.stdout;
        combined.push_str(&output.stderr);
        Ok(combined)
    }

    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        self.invoke(&args).await
    }
}
