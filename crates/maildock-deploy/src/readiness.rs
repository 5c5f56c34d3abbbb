//! Readiness polling: typed probes under a generic fixed-interval loop.
//!
//! Each service type gets its own [`ReadinessProbe`] implementation; the
//! looping logic lives once in [`poll_until_ready`], parameterised by
//! interval and tick budget. Polling is fixed-interval with no backoff and
//! no jitter. A probe that never succeeds aborts the run after exactly the
//! configured budget, surfacing the tail of the container's log.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use maildock_core::{DeployConfig, DeployError, ProbeSpec, ServiceSpec};
use maildock_runtime::{ContainerRuntime, RuntimeError};

/// Log lines surfaced when a readiness check times out.
pub const LOG_TAIL_LINES: usize = 20;

/// Outcome of a single probe evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    NotReady,
}

/// One readiness predicate against one target container.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Container the probe runs against.
    fn target(&self) -> &str;

    /// Human-readable description for log lines.
    fn describe(&self) -> String;

    /// Evaluate the predicate once.
    async fn check(&self, runtime: &dyn ContainerRuntime) -> Result<Probe, RuntimeError>;
}

/// Ready when a recursive lookup inside the resolver returns at least one
/// numeric answer.
pub struct DnsLookupProbe {
    pub container: String,
    pub lookup_name: String,
}

#[async_trait]
impl ReadinessProbe for DnsLookupProbe {
    fn target(&self) -> &str {
        &self.container
    }

    fn describe(&self) -> String {
        format!("recursive lookup of {}", self.lookup_name)
    }

    async fn check(&self, runtime: &dyn ContainerRuntime) -> Result<Probe, RuntimeError> {
        let output = runtime
            .exec(
                &self.container,
                &["dig", "+short", "+time=1", &self.lookup_name, "@127.0.0.1"],
            )
            .await?;
        if !output.success() {
            return Ok(Probe::NotReady);
        }
        let answered = output
            .stdout
            .lines()
            .any(|line| line.trim().parse::<IpAddr>().is_ok());
        Ok(if answered { Probe::Ready } else { Probe::NotReady })
    }
}

/// Ready when the cache answers its ping with the exact acknowledgment token.
pub struct CachePingProbe {
    pub container: String,
}

#[async_trait]
impl ReadinessProbe for CachePingProbe {
    fn target(&self) -> &str {
        &self.container
    }

    fn describe(&self) -> String {
        "cache ping".to_string()
    }

    async fn check(&self, runtime: &dyn ContainerRuntime) -> Result<Probe, RuntimeError> {
        let output = runtime
            .exec(&self.container, &["redis-cli", "ping"])
            .await?;
        Ok(if output.success() && output.stdout.trim() == "PONG" {
            Probe::Ready
        } else {
            Probe::NotReady
        })
    }
}

/// Ready when the container log contains a fixed token.
pub struct LogTokenProbe {
    pub container: String,
    pub token: String,
}

#[async_trait]
impl ReadinessProbe for LogTokenProbe {
    fn target(&self) -> &str {
        &self.container
    }

    fn describe(&self) -> String {
        format!("log token `{}`", self.token)
    }

    async fn check(&self, runtime: &dyn ContainerRuntime) -> Result<Probe, RuntimeError> {
        let logs = runtime.container_logs(&self.container, 50).await?;
        Ok(if logs.contains(&self.token) {
            Probe::Ready
        } else {
            Probe::NotReady
        })
    }
}

/// Instantiate the declared probe for a service, if it has one.
pub fn probe_for(service: &ServiceSpec) -> Option<Box<dyn ReadinessProbe>> {
    match service.probe {
        Some(ProbeSpec::DnsLookup { ref lookup_name }) => Some(Box::new(DnsLookupProbe {
            container: service.container_name.clone(),
            lookup_name: lookup_name.clone(),
        })),
        Some(ProbeSpec::CachePing) => Some(Box::new(CachePingProbe {
            container: service.container_name.clone(),
        })),
        Some(ProbeSpec::LogToken { ref token }) => Some(Box::new(LogTokenProbe {
            container: service.container_name.clone(),
            token: token.clone(),
        })),
        None => None,
    }
}

/// Polling cadence for one deployment.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub budget_ticks: u64,
}

impl PollSettings {
    pub fn from_config(config: &DeployConfig) -> Self {
        PollSettings {
            interval: Duration::from_secs(config.poll_interval_secs),
            budget_ticks: config.poll_budget_ticks,
        }
    }
}

/// Poll a probe at a fixed interval until it reports Ready or the tick
/// budget is spent.
///
/// Returns the 1-based tick on which the probe succeeded. On timeout the
/// target's last log lines are captured into the error and the run aborts.
pub async fn poll_until_ready(
    runtime: &dyn ContainerRuntime,
    service: &str,
    probe: &dyn ReadinessProbe,
    settings: &PollSettings,
) -> Result<u64, DeployError> {
    for tick in 1..=settings.budget_ticks {
        match probe.check(runtime).await {
            Ok(Probe::Ready) => return Ok(tick),
            Ok(Probe::NotReady) => {
                debug!(service = %service, tick = tick, check = %probe.describe(), "not ready yet");
            }
            // A failing check command counts as not-ready: the container may
            // still be coming up.
            Err(error) => {
                debug!(service = %service, tick = tick, error = %error, "probe errored");
            }
        }
        tokio::time::sleep(settings.interval).await;
    }

    let last_logs = runtime
        .container_logs(probe.target(), LOG_TAIL_LINES)
        .await
        .unwrap_or_default();

    Err(DeployError::ReadinessTimeout {
        service: service.to_string(),
        ticks: settings.budget_ticks,
        last_logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maildock_runtime::fakes::FakeRuntime;
    use maildock_runtime::ExecOutput;

    struct NeverReady;

    #[async_trait]
    impl ReadinessProbe for NeverReady {
        fn target(&self) -> &str {
            "maildock-resolver"
        }

        fn describe(&self) -> String {
            "never ready".to_string()
        }

        async fn check(&self, _runtime: &dyn ContainerRuntime) -> Result<Probe, RuntimeError> {
            Ok(Probe::NotReady)
        }
    }

    #[tokio::test]
    async fn test_dns_probe_requires_numeric_answer() {
        let runtime = FakeRuntime::new();
        let probe = DnsLookupProbe {
            container: "maildock-resolver".to_string(),
            lookup_name: "root-servers.net".to_string(),
        };

        runtime.queue_exec("maildock-resolver", ExecOutput::ok(""));
        runtime.queue_exec(
            "maildock-resolver",
            ExecOutput::ok(";; connection timed out\n"),
        );
        runtime.queue_exec(
            "maildock-resolver",
            ExecOutput::ok("198.41.0.4\n192.5.5.241\n"),
        );

        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::NotReady);
        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::NotReady);
        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::Ready);
    }

    #[tokio::test]
    async fn test_cache_probe_matches_exact_token() {
        let runtime = FakeRuntime::new();
        let probe = CachePingProbe {
            container: "maildock-cache".to_string(),
        };

        runtime.queue_exec("maildock-cache", ExecOutput::err(1, "LOADING"));
        runtime.queue_exec("maildock-cache", ExecOutput::ok("PONGish"));
        runtime.queue_exec("maildock-cache", ExecOutput::ok("PONG\n"));

        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::NotReady);
        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::NotReady);
        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::Ready);
    }

    #[tokio::test]
    async fn test_log_token_probe() {
        let runtime = FakeRuntime::new();
        let probe = LogTokenProbe {
            container: "maildock-auth".to_string(),
            token: "Listening on".to_string(),
        };

        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::NotReady);
        runtime.set_logs("maildock-auth", "time=... msg=\"Listening on :4181\"");
        assert_eq!(probe.check(&runtime).await.unwrap(), Probe::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_aborts_after_exact_budget() {
        let runtime = FakeRuntime::new();
        runtime.set_logs("maildock-resolver", "last lines before timeout");
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            budget_ticks: 60,
        };

        let started = tokio::time::Instant::now();
        let err = poll_until_ready(&runtime, "resolver", &NeverReady, &settings)
            .await
            .unwrap_err();

        // 60 ticks at 2s intervals: abort at exactly 120s of polling
        assert_eq!(started.elapsed(), Duration::from_secs(120));
        match err {
            DeployError::ReadinessTimeout {
                service,
                ticks,
                last_logs,
            } => {
                assert_eq!(service, "resolver");
                assert_eq!(ticks, 60);
                assert!(last_logs.contains("last lines before timeout"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_returns_success_tick() {
        let runtime = FakeRuntime::new();
        runtime.queue_exec("maildock-cache", ExecOutput::err(1, "LOADING"));
        runtime.queue_exec("maildock-cache", ExecOutput::err(1, "LOADING"));
        runtime.set_exec_response("maildock-cache", ExecOutput::ok("PONG"));

        let probe = CachePingProbe {
            container: "maildock-cache".to_string(),
        };
        let settings = PollSettings {
            interval: Duration::from_secs(2),
            budget_ticks: 30,
        };

        let tick = poll_until_ready(&runtime, "cache", &probe, &settings)
            .await
            .unwrap();
        assert_eq!(tick, 3);
    }
}
