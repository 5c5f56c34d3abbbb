//! Post-deploy status reporting.
//!
//! A single snapshot taken after the settle period: every declared
//! container is queried once for its running state, with no retries. The
//! resulting report either carries access URLs and operator hints or the
//! failure list with the commands to inspect it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maildock_core::{DeployConfig, DeployPlan};
use maildock_runtime::{ContainerRuntime, RuntimeError};

/// Final running-state snapshot of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub checked_at: DateTime<Utc>,
    /// Containers found running, in declaration order.
    pub running: Vec<String>,
    /// Containers declared but not running.
    pub missing: Vec<String>,
    /// Access URLs, derived from the hostnames configuration.
    pub urls: Vec<String>,
    /// Operator hints: diagnostics on failure, next steps on success.
    pub hints: Vec<String>,
}

impl DeployReport {
    /// Whether every declared container was found running.
    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty()
    }

    /// Render the report as operator-facing text.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Deployment Status\n");
        out.push_str("=================\n");
        for name in &self.running {
            out.push_str(&format!("  ✓ {}\n", name));
        }
        for name in &self.missing {
            out.push_str(&format!("  ✗ {} (not running)\n", name));
        }

        if !self.urls.is_empty() {
            out.push_str("\nAccess:\n");
            for url in &self.urls {
                out.push_str(&format!("  {}\n", url));
            }
        }
        if !self.hints.is_empty() {
            out.push_str("\nHints:\n");
            for hint in &self.hints {
                out.push_str(&format!("  {}\n", hint));
            }
        }

        out.trim_end().to_string()
    }
}

/// Access URLs derived from the hostnames configuration.
pub fn access_urls(config: &DeployConfig) -> Vec<String> {
    let primary = config.primary_hostname();
    let mut urls = vec![
        format!("https://{}/", primary),
        format!("https://{}/admin", primary),
    ];
    if let Some(ref auth) = config.forward_auth {
        urls.push(format!("https://{}/", auth.auth_host));
    }
    urls
}

/// Log-inspection commands for containers that are not running.
pub fn diagnostic_hints(missing: &[String]) -> Vec<String> {
    missing
        .iter()
        .map(|name| format!("inspect with: docker logs --tail 50 {}", name))
        .collect()
}

/// Take the single post-deploy snapshot and build the report.
pub async fn final_check(
    config: &DeployConfig,
    plan: &DeployPlan,
    runtime: &dyn ContainerRuntime,
) -> Result<DeployReport, RuntimeError> {
    let mut running = Vec::new();
    let mut missing = Vec::new();

    for name in plan.container_names() {
        if runtime.container_running(name).await? {
            running.push(name.to_string());
        } else {
            missing.push(name.to_string());
        }
    }

    let (urls, hints) = if missing.is_empty() {
        (
            access_urls(config),
            vec![
                format!(
                    "point the MX record of {} at {}",
                    config.domain,
                    config.primary_hostname()
                ),
                "create the first admin account via the admin UI".to_string(),
            ],
        )
    } else {
        (Vec::new(), diagnostic_hints(&missing))
    };

    Ok(DeployReport {
        checked_at: Utc::now(),
        running,
        missing,
        urls,
        hints,
    })
}
