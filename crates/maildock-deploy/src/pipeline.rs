//! The deployment sequencer.
//!
//! Strictly linear, single-threaded control flow: validate → check engine →
//! prepare resources → remove stale containers → pull images →
//! dependency-ordered start with readiness polling → settle → final status
//! snapshot. Every fatal condition aborts the whole run immediately; there
//! is no rollback of containers already started (teardown is a separate
//! operation).

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use maildock_core::{
    emit_deploy_finished, emit_deploy_started, emit_service_ready, emit_service_started,
    DeployConfig, DeployError, DeployPlan, DeploySpan, ServiceSpec,
};
use maildock_runtime::{ContainerRuntime, RunRequest, VolumeMount};

use crate::prepare;
use crate::readiness::{self, PollSettings};
use crate::reporter::{self, DeployReport};
use crate::scheduler;

/// Per-service record of what the sequencer did.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOutcome {
    pub service: String,
    pub container: String,
    pub image: String,
    /// Tick on which the readiness probe succeeded; `None` for services
    /// without a declared probe.
    pub ready_after_ticks: Option<u64>,
}

/// Result of a complete deployment run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub run_id: String,
    pub plan_digest: String,
    pub services: Vec<ServiceOutcome>,
    pub duration_ms: u64,
    pub report: DeployReport,
}

impl DeployOutcome {
    /// Number of services that proved readiness via a probe.
    pub fn probed_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.ready_after_ticks.is_some())
            .count()
    }
}

/// Map a declared service onto the runtime's run argument set.
fn to_run_request(config: &DeployConfig, service: &ServiceSpec) -> RunRequest {
    let mut request = RunRequest::new(&service.container_name, &service.image);
    request.network = Some(config.network_name.clone());
    request.static_address = service.static_address.clone();
    request.dns_server = service.dns_server.clone();
    request.env = service.env.clone();
    request.mounts = service
        .mounts
        .iter()
        .map(|mount| {
            let vm = VolumeMount::new(&mount.host_path, &mount.container_path);
            if mount.read_only {
                vm.read_only()
            } else {
                vm
            }
        })
        .collect();
    request.labels = service.labels.clone();
    request.ports = service.ports.clone();
    request
}

/// Deployment sequencer.
pub struct DeployPipeline;

impl DeployPipeline {
    /// Execute the whole deployment sequence for a plan.
    ///
    /// Invariants enforced here:
    /// - No container-mutating command is issued before validation succeeds.
    /// - Image pulls all complete before the first service starts.
    /// - A service starts only after every prerequisite reported Ready.
    pub async fn run(
        config: &DeployConfig,
        plan: &DeployPlan,
        runtime: &dyn ContainerRuntime,
    ) -> Result<DeployOutcome, DeployError> {
        let started = Instant::now();
        config.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let _span = DeploySpan::enter(&run_id);
        let plan_digest = plan.digest();
        emit_deploy_started(&run_id, &plan_digest, plan.services.len());

        runtime
            .version()
            .await
            .map_err(|_| DeployError::RuntimeUnavailable)?;

        // Resolve the start order up front: an inconsistent graph should
        // fail before any resource is touched.
        let order = scheduler::start_order(plan)?;

        prepare::prepare_resources(config, plan, runtime).await?;

        for name in plan.container_names() {
            runtime.remove_container(name).await?;
        }

        // Images are a hard dependency: any pull failure aborts before the
        // first service starts, leaving nothing newly running.
        for image in plan.image_refs() {
            info!(image = %image, "pulling image");
            runtime
                .pull_image(image)
                .await
                .map_err(|error| DeployError::Pull {
                    image: image.to_string(),
                    detail: error.to_string(),
                })?;
        }

        let settings = PollSettings::from_config(config);
        let mut services = Vec::with_capacity(order.len());

        for service in order {
            info!(service = %service.name, container = %service.container_name, "starting service");
            runtime
                .run_container(&to_run_request(config, service))
                .await?;
            emit_service_started(&run_id, &service.name, &service.container_name);

            // A container can declare only one network at creation time;
            // the proxy network is joined as a separate step.
            if service.join_proxy_network {
                runtime
                    .connect_network(&config.proxy_network, &service.container_name)
                    .await?;
            }

            let ready_after_ticks = match readiness::probe_for(service) {
                Some(probe) => {
                    let ticks =
                        readiness::poll_until_ready(runtime, &service.name, probe.as_ref(), &settings)
                            .await?;
                    emit_service_ready(&run_id, &service.name, ticks);
                    Some(ticks)
                }
                None => None,
            };

            services.push(ServiceOutcome {
                service: service.name.clone(),
                container: service.container_name.clone(),
                image: service.image.clone(),
                ready_after_ticks,
            });
        }

        tokio::time::sleep(Duration::from_secs(config.settle_secs)).await;
        let report = reporter::final_check(config, plan, runtime).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !report.is_healthy() {
            emit_deploy_finished(&run_id, duration_ms, false);
            return Err(DeployError::PostDeployDrift {
                names: report.missing,
            });
        }

        emit_deploy_finished(&run_id, duration_ms, true);
        Ok(DeployOutcome {
            run_id,
            plan_digest,
            services,
            duration_ms,
            report,
        })
    }

    /// Force-remove every declared container (teardown mirror of the
    /// stale-removal step).
    pub async fn teardown(
        plan: &DeployPlan,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Vec<String>, DeployError> {
        runtime
            .version()
            .await
            .map_err(|_| DeployError::RuntimeUnavailable)?;

        let mut removed = Vec::new();
        for name in plan.container_names() {
            runtime.remove_container(name).await?;
            removed.push(name.to_string());
        }
        Ok(removed)
    }
}
