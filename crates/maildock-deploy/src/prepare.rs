//! Host and runtime resource preparation.
//!
//! Everything here runs before the first container starts: data
//! directories, best-effort ownership, network destroy-recreate, and the
//! best-effort root-hints download. Warning-grade steps never abort the
//! run.

use tracing::{debug, info};

use maildock_core::{
    emit_prepare_warning, DeployConfig, DeployError, DeployPlan, ProxyNetworkPolicy, DATA_SUBDIRS,
};
use maildock_runtime::ContainerRuntime;

/// Bootstrap list of authoritative DNS servers for the resolver.
pub const ROOT_HINTS_URL: &str = "https://www.internic.net/domain/named.root";

/// Prepare every host and runtime resource the plan depends on.
pub async fn prepare_resources(
    config: &DeployConfig,
    plan: &DeployPlan,
    runtime: &dyn ContainerRuntime,
) -> Result<(), DeployError> {
    ensure_data_dirs(config)?;
    fix_ownership(config);
    prepare_networks(config, plan, runtime).await?;
    download_root_hints(config).await;
    Ok(())
}

/// Create the fixed data subdirectory set, idempotently.
pub fn ensure_data_dirs(config: &DeployConfig) -> Result<(), DeployError> {
    for subdir in DATA_SUBDIRS {
        std::fs::create_dir_all(config.data_dir.join(subdir))?;
    }
    debug!(data_dir = %config.data_dir.display(), "data directories present");
    Ok(())
}

/// Apply the configured numeric owner to the data tree.
///
/// May require elevated privilege; failure is a warning, not fatal.
#[cfg(unix)]
pub fn fix_ownership(config: &DeployConfig) {
    use std::os::unix::fs::chown;

    let targets = std::iter::once(config.data_dir.clone())
        .chain(DATA_SUBDIRS.iter().map(|s| config.data_dir.join(s)));
    for path in targets {
        if let Err(error) = chown(&path, Some(config.data_uid), Some(config.data_gid)) {
            emit_prepare_warning("ownership", &error);
            return;
        }
    }
}

#[cfg(not(unix))]
pub fn fix_ownership(_config: &DeployConfig) {}

/// Bring every declared network into its required state.
///
/// Sequencer-owned networks are destroyed and recreated with the desired
/// subnet: the CLI offers no way to inspect whether an existing network's
/// subnet matches, so recreate is the only honest policy. The external
/// proxy network is handled per the configured policy.
pub async fn prepare_networks(
    config: &DeployConfig,
    plan: &DeployPlan,
    runtime: &dyn ContainerRuntime,
) -> Result<(), DeployError> {
    for network in &plan.networks {
        if network.external {
            if runtime.network_exists(&network.name).await? {
                continue;
            }
            match config.proxy_network_policy {
                ProxyNetworkPolicy::RequireExisting => {
                    return Err(DeployError::NetworkPrerequisite(network.name.clone()));
                }
                ProxyNetworkPolicy::CreateIfMissing => {
                    info!(network = %network.name, "creating missing proxy network");
                    runtime.create_network(&network.name, None).await?;
                }
            }
        } else {
            runtime.remove_network(&network.name).await?;
            runtime
                .create_network(&network.name, network.subnet.as_deref())
                .await?;
            info!(network = %network.name, subnet = ?network.subnet, "network recreated");
        }
    }
    Ok(())
}

/// Fetch the DNS root hints into the resolver's data directory.
///
/// Best effort: the resolver image carries a built-in fallback, so a failed
/// download is a warning. An already-present hints file is kept as is.
pub async fn download_root_hints(config: &DeployConfig) {
    let destination = config.data_dir.join("dns").join("root.hints");
    if destination.exists() {
        debug!(path = %destination.display(), "root hints already present");
        return;
    }

    match fetch_root_hints().await {
        Ok(bytes) => match std::fs::write(&destination, &bytes) {
            Ok(()) => info!(path = %destination.display(), "root hints downloaded"),
            Err(error) => emit_prepare_warning("root_hints", &error),
        },
        Err(error) => emit_prepare_warning("root_hints", &error),
    }
}

async fn fetch_root_hints() -> Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?;
    let response = client
        .get(ROOT_HINTS_URL)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
