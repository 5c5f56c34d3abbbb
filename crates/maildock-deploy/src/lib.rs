//! Maildock Deploy - the deployment sequencer
//!
//! Provides the linear deploy pipeline that:
//! - Prepares host directories and container networks
//! - Removes stale containers and pulls the declared images
//! - Starts services in dependency order, polling typed readiness probes
//! - Takes the final running-state snapshot and builds the report

pub mod pipeline;
pub mod prepare;
pub mod readiness;
pub mod reporter;
pub mod scheduler;

// Re-export key types
pub use pipeline::{DeployOutcome, DeployPipeline, ServiceOutcome};
pub use readiness::{
    poll_until_ready, probe_for, CachePingProbe, DnsLookupProbe, LogTokenProbe, PollSettings,
    Probe, ReadinessProbe, LOG_TAIL_LINES,
};
pub use reporter::{access_urls, final_check, DeployReport};
pub use scheduler::start_order;
