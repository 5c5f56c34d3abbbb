//! In-memory fake for the runtime trait (testing only)
//!
//! `FakeRuntime` satisfies the [`ContainerRuntime`] contract without a
//! container engine: networks and containers live in a mutex-guarded map,
//! failures and probe outputs are scripted up front, and every call is
//! recorded so tests can assert ordering and absence of side effects.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::{ContainerRuntime, ExecOutput, Result, RunRequest};

#[derive(Debug, Default)]
struct FakeState {
    /// network name -> subnet it was created with
    networks: HashMap<String, Option<String>>,
    /// containers currently considered running
    running: BTreeSet<String>,
    /// containers scripted to report not-running regardless of `running`
    stopped: BTreeSet<String>,
    /// (network, container) joins in order
    connections: Vec<(String, String)>,
    /// images pulled, in order
    pulled: Vec<String>,
    /// containers removed, in order
    removed: Vec<String>,
    /// containers started, in order
    started: Vec<String>,
    /// coarse log of every trait call, in order
    calls: Vec<String>,
    /// per-container scripted exec outputs, drained front-first
    exec_queue: HashMap<String, VecDeque<ExecOutput>>,
    /// per-container sticky exec output once the queue is drained
    exec_sticky: HashMap<String, ExecOutput>,
    /// per-container log content
    logs: HashMap<String, String>,
    /// images whose pull is scripted to fail
    failing_pulls: BTreeSet<String>,
    /// whether the engine answers at all
    available: bool,
}

/// Scriptable in-memory container runtime
#[derive(Debug)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        FakeRuntime {
            state: Mutex::new(FakeState {
                available: true,
                ..Default::default()
            }),
        }
    }

    /// Script the engine as unreachable.
    pub fn set_unavailable(&self) {
        self.state.lock().unwrap().available = false;
    }

    /// Pre-create a network, as an externally-managed one would be.
    pub fn preexisting_network(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(name.to_string(), None);
    }

    /// Script the pull of one image to fail.
    pub fn fail_pull(&self, image: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_pulls
            .insert(image.to_string());
    }

    /// Queue one exec output for a container (drained front-first).
    pub fn queue_exec(&self, container: &str, output: ExecOutput) {
        self.state
            .lock()
            .unwrap()
            .exec_queue
            .entry(container.to_string())
            .or_default()
            .push_back(output);
    }

    /// Set the exec output a container keeps returning once its queue is empty.
    pub fn set_exec_response(&self, container: &str, output: ExecOutput) {
        self.state
            .lock()
            .unwrap()
            .exec_sticky
            .insert(container.to_string(), output);
    }

    /// Set the log content a container reports.
    pub fn set_logs(&self, container: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(container.to_string(), content.to_string());
    }

    /// Script a started container to report not-running at later checks.
    pub fn mark_stopped(&self, container: &str) {
        self.state
            .lock()
            .unwrap()
            .stopped
            .insert(container.to_string());
    }

    /// Containers started so far, in start order.
    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    /// Images pulled so far, in pull order.
    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    /// Containers removed so far, in removal order.
    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Currently-running container names.
    pub fn running_containers(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .running
            .iter()
            .filter(|name| !state.stopped.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// (network, container) joins so far.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().connections.clone()
    }

    /// Whether a network currently exists, and the subnet it carries.
    pub fn network_subnet(&self, name: &str) -> Option<Option<String>> {
        self.state.lock().unwrap().networks.get(name).cloned()
    }

    /// Every trait call made so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn version(&self) -> Result<String> {
        self.record("version".to_string());
        if self.state.lock().unwrap().available {
            Ok("fake-engine-24.0".to_string())
        } else {
            Err(RuntimeError::RuntimeNotFound)
        }
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        self.record(format!("network_exists {}", name));
        Ok(self.state.lock().unwrap().networks.contains_key(name))
    }

    async fn create_network(&self, name: &str, subnet: Option<&str>) -> Result<()> {
        self.record(format!("create_network {}", name));
        let mut state = self.state.lock().unwrap();
        if state.networks.contains_key(name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("network create {}", name),
                stderr: format!("network with name {} already exists", name),
            });
        }
        state
            .networks
            .insert(name.to_string(), subnet.map(str::to_string));
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.record(format!("remove_network {}", name));
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        self.record(format!("connect_network {} {}", network, container));
        let mut state = self.state.lock().unwrap();
        if !state.networks.contains_key(network) {
            return Err(RuntimeError::NoSuchNetwork(network.to_string()));
        }
        state
            .connections
            .push((network.to_string(), container.to_string()));
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(format!("pull_image {}", image));
        let mut state = self.state.lock().unwrap();
        if state.failing_pulls.contains(image) {
            return Err(RuntimeError::CommandFailed {
                command: format!("pull {}", image),
                stderr: "manifest unknown".to_string(),
            });
        }
        state.pulled.push(image.to_string());
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(format!("remove_container {}", name));
        let mut state = self.state.lock().unwrap();
        state.running.remove(name);
        state.removed.push(name.to_string());
        Ok(())
    }

    async fn run_container(&self, request: &RunRequest) -> Result<()> {
        self.record(format!("run_container {}", request.name));
        let mut state = self.state.lock().unwrap();
        if state.running.contains(&request.name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("run --name {}", request.name),
                stderr: format!("container name \"{}\" is already in use", request.name),
            });
        }
        state.running.insert(request.name.clone());
        state.started.push(request.name.clone());
        Ok(())
    }

    async fn container_running(&self, name: &str) -> Result<bool> {
        self.record(format!("container_running {}", name));
        let state = self.state.lock().unwrap();
        Ok(state.running.contains(name) && !state.stopped.contains(name))
    }

    async fn container_logs(&self, name: &str, _tail: usize) -> Result<String> {
        self.record(format!("container_logs {}", name));
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn exec(&self, container: &str, command: &[&str]) -> Result<ExecOutput> {
        self.record(format!("exec {} {}", container, command.join(" ")));
        let mut state = self.state.lock().unwrap();
        if let Some(queue) = state.exec_queue.get_mut(container) {
            if let Some(output) = queue.pop_front() {
                return Ok(output);
            }
        }
        if let Some(sticky) = state.exec_sticky.get(container) {
            return Ok(sticky.clone());
        }
        Ok(ExecOutput::ok(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_then_remove_is_idempotent_on_name() {
        let runtime = FakeRuntime::new();
        let request = RunRequest::new("mail-cache", "redis:7-alpine");

        runtime.run_container(&request).await.unwrap();
        assert!(runtime.run_container(&request).await.is_err());

        runtime.remove_container("mail-cache").await.unwrap();
        runtime.run_container(&request).await.unwrap();

        assert_eq!(runtime.running_containers(), vec!["mail-cache"]);
    }

    #[tokio::test]
    async fn test_scripted_pull_failure() {
        let runtime = FakeRuntime::new();
        runtime.fail_pull("ghcr.io/maildock/admin:2.0");

        assert!(runtime.pull_image("redis:7-alpine").await.is_ok());
        assert!(runtime
            .pull_image("ghcr.io/maildock/admin:2.0")
            .await
            .is_err());
        assert_eq!(runtime.pulled(), vec!["redis:7-alpine"]);
    }

    #[tokio::test]
    async fn test_exec_queue_drains_before_sticky() {
        let runtime = FakeRuntime::new();
        runtime.queue_exec("mail-cache", ExecOutput::err(1, "LOADING"));
        runtime.set_exec_response("mail-cache", ExecOutput::ok("PONG"));

        let first = runtime.exec("mail-cache", &["redis-cli", "ping"]).await.unwrap();
        let second = runtime.exec("mail-cache", &["redis-cli", "ping"]).await.unwrap();

        assert!(!first.success());
        assert_eq!(second.stdout, "PONG");
    }

    #[tokio::test]
    async fn test_remove_absent_container_is_ok() {
        let runtime = FakeRuntime::new();
        assert!(runtime.remove_container("never-started").await.is_ok());
    }
}
