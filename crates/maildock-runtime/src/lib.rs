//! Maildock-Runtime: the container runtime CLI surface for maildock
//!
//! This crate isolates every interaction with the container engine behind
//! the [`ContainerRuntime`] trait. The production implementation,
//! [`DockerCli`], shells out to the `docker` binary and feeds back exit
//! codes and captured output; an in-memory fake for tests lives in the
//! `fakes` module.
//!
//! The trait is deliberately narrow: it covers exactly the network, image,
//! and container operations the deployment sequencer issues, nothing more.

use async_trait::async_trait;
use std::process::Command;

pub mod docker;
pub mod error;
pub mod fakes;

pub use docker::DockerCli;
pub use error::RuntimeError;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Captured output of a runtime command or an in-container exec
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ExecOutput {
    /// Successful output carrying the given stdout.
    pub fn ok(stdout: &str) -> Self {
        ExecOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Failed output carrying the given exit code and stderr.
    pub fn err(exit_code: i32, stderr: &str) -> Self {
        ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A host-path to container-path bind mount
#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn new(host_path: &str, container_path: &str) -> Self {
        VolumeMount {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Full argument set for starting one detached container
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Container name (also the runtime-namespace identity)
    pub name: String,
    /// Image reference to run
    pub image: String,
    /// Environment variables passed with `-e`
    pub env: Vec<(String, String)>,
    /// Bind mounts passed with `-v`
    pub mounts: Vec<VolumeMount>,
    /// Primary network to attach at creation time
    pub network: Option<String>,
    /// Static address on the primary network
    pub static_address: Option<String>,
    /// DNS server handed to the container with `--dns`
    pub dns_server: Option<String>,
    /// Metadata labels passed with `--label`
    pub labels: Vec<(String, String)>,
    /// Published ports as (host, container) pairs
    pub ports: Vec<(u16, u16)>,
    /// Restart policy (e.g. `unless-stopped`)
    pub restart: Option<String>,
}

impl RunRequest {
    /// Start building a request for the given container name and image.
    pub fn new(name: &str, image: &str) -> Self {
        RunRequest {
            name: name.to_string(),
            image: image.to_string(),
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        }
    }

    /// Render the `docker run` argument vector for this request.
    ///
    /// The image reference always comes last; a single network and static
    /// address are declared at creation time (further networks are joined
    /// with a separate `network connect` call, since the CLI accepts only
    /// one `--network` at creation).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];

        if let Some(ref policy) = self.restart {
            args.push("--restart".to_string());
            args.push(policy.clone());
        }
        if let Some(ref network) = self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if let Some(ref address) = self.static_address {
            args.push("--ip".to_string());
            args.push(address.clone());
        }
        if let Some(ref dns) = self.dns_server {
            args.push("--dns".to_string());
            args.push(dns.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for mount in &self.mounts {
            let mut spec = format!("{}:{}", mount.host_path, mount.container_path);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(spec);
        }
        for (host, container) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host, container));
        }
        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.image.clone());
        args
    }
}

/// The container runtime operations the sequencer depends on.
///
/// Every method maps to one CLI invocation; exit codes and captured output
/// are the only feedback channel. Destructive operations (`remove_*`) are
/// idempotent on absence.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Query the engine version; the canonical availability check.
    async fn version(&self) -> Result<String>;

    /// Whether a network with this name exists.
    async fn network_exists(&self, name: &str) -> Result<bool>;

    /// Create a network, optionally pinned to a subnet.
    async fn create_network(&self, name: &str, subnet: Option<&str>) -> Result<()>;

    /// Remove a network. Absence is not an error.
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Join an existing container to an additional network.
    async fn connect_network(&self, network: &str, container: &str) -> Result<()>;

    /// Pull an image from its registry.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Force-remove a container by name. Absence is not an error.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Start one detached container with the full declared argument set.
    async fn run_container(&self, request: &RunRequest) -> Result<()>;

    /// Whether the named container is currently running.
    async fn container_running(&self, name: &str) -> Result<bool>;

    /// Last `tail` lines of the container's log.
    async fn container_logs(&self, name: &str, tail: usize) -> Result<String>;

    /// Execute a command inside a running container.
    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput>;
}

/// Check whether the docker binary is present and answers at all.
///
/// Synchronous on purpose: called once at startup before the runtime
/// abstraction is constructed.
pub fn is_docker_available() -> bool {
    Command::new("docker")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_minimal_args() {
        let request = RunRequest::new("mail-cache", "redis:7-alpine");
        let args = request.to_args();

        assert_eq!(args[0], "run");
        assert_eq!(args[1], "-d");
        assert!(args.contains(&"--name".to_string()));
        assert!(args.contains(&"mail-cache".to_string()));
        // Image reference is always the final argument
        assert_eq!(args.last().unwrap(), "redis:7-alpine");
    }

    #[test]
    fn test_run_request_full_args_order() {
        let mut request = RunRequest::new("mail-front", "ghcr.io/maildock/nginx:2.0");
        request.network = Some("maildock".to_string());
        request.static_address = Some("192.168.203.10".to_string());
        request.dns_server = Some("192.168.203.254".to_string());
        request.env.push(("DOMAIN".to_string(), "example.com".to_string()));
        request
            .mounts
            .push(VolumeMount::new("/srv/maildock/certs", "/certs").read_only());
        request.ports.push((25, 25));
        request
            .labels
            .push(("traefik.enable".to_string(), "true".to_string()));

        let args = request.to_args();
        let joined = args.join(" ");

        assert!(joined.contains("--network maildock"));
        assert!(joined.contains("--ip 192.168.203.10"));
        assert!(joined.contains("--dns 192.168.203.254"));
        assert!(joined.contains("-e DOMAIN=example.com"));
        assert!(joined.contains("-v /srv/maildock/certs:/certs:ro"));
        assert!(joined.contains("-p 25:25"));
        assert!(joined.contains("--label traefik.enable=true"));
        assert_eq!(args.last().unwrap(), "ghcr.io/maildock/nginx:2.0");
    }

    #[test]
    fn test_exec_output_success() {
        assert!(ExecOutput::ok("PONG").success());
        assert!(!ExecOutput::err(1, "boom").success());
    }
}
