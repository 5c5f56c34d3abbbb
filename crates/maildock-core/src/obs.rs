//! Tracing bootstrap and structured lifecycle events for maildock runs.
//!
//! [`init_tracing`] configures the global subscriber once per process
//! (`RUST_LOG` wins over the supplied level; `--json` switches to
//! newline-delimited JSON lines). The `emit_*` functions are the single
//! vocabulary of deploy lifecycle events, and [`DeploySpan`] tags every
//! record inside a run with its run id.

use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// RAII guard that enters a run-scoped span for the duration of a deploy.
pub struct DeploySpan {
    _span: tracing::span::EnteredSpan,
}

impl DeploySpan {
    /// Create and enter a span tagged with the run id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("maildock.deploy", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: deploy run started.
pub fn emit_deploy_started(run_id: &str, plan_digest: &str, service_count: usize) {
    info!(
        event = "deploy.started",
        run_id = %run_id,
        plan_digest = %plan_digest,
        services = service_count,
    );
}

/// Emit event: one container started.
pub fn emit_service_started(run_id: &str, service: &str, container: &str) {
    info!(event = "deploy.service_started", run_id = %run_id, service = %service, container = %container);
}

/// Emit event: a readiness probe succeeded after `ticks` polls.
pub fn emit_service_ready(run_id: &str, service: &str, ticks: u64) {
    info!(event = "deploy.service_ready", run_id = %run_id, service = %service, ticks = ticks);
}

/// Emit event: deploy run finished.
pub fn emit_deploy_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "deploy.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a best-effort preparation step failed (warning level).
pub fn emit_prepare_warning(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "deploy.prepare_warning", step = %step, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_span_create() {
        // Just ensure the span guard doesn't panic
        let _span = DeploySpan::enter("test-run-id");
    }

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
