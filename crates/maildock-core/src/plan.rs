//! The deployment plan: which containers run, on which networks, in which
//! order, and how each one proves it is ready.
//!
//! The plan is declared data, not behavior: the sequencer walks it. Service
//! dependencies are explicit (`depends_on`), so start ordering is derived
//! from the graph instead of source position.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{DeployConfig, ForwardAuthConfig};
use crate::labels;

/// Host data subdirectories every deployment gets, created idempotently.
pub const DATA_SUBDIRS: [&str; 10] = [
    "certs", "data", "dkim", "dns", "filter", "mail", "mailqueue", "overrides", "redis", "webmail",
];

/// How a service proves readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSpec {
    /// Recursive lookup inside the resolver; ready when at least one
    /// numeric answer comes back.
    DnsLookup { lookup_name: String },
    /// Cache ping; ready on the exact acknowledgment token.
    CachePing,
    /// Ready when the container log contains the token.
    LogToken { token: String },
}

/// A host-path to container-path mount in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// One declared service container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Short service name, also the `depends_on` vocabulary.
    pub name: String,
    /// Runtime container name (`{prefix}-{name}`).
    pub container_name: String,
    /// Image reference to pull and run.
    pub image: String,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<MountSpec>,
    /// Static address on the internal network, if any.
    pub static_address: Option<String>,
    /// Whether to join the reverse-proxy network after creation.
    pub join_proxy_network: bool,
    /// DNS server handed to the container (the stack resolver).
    pub dns_server: Option<String>,
    /// Reverse-proxy routing labels (internet-facing services only).
    pub labels: Vec<(String, String)>,
    /// Published (host, container) ports.
    pub ports: Vec<(u16, u16)>,
    /// Declared readiness check, polled after start.
    pub probe: Option<ProbeSpec>,
    /// Services that must be Ready before this one starts.
    pub depends_on: Vec<String>,
}

impl ServiceSpec {
    /// Create a service with the mandatory identity fields.
    pub fn new(name: &str, container_name: &str, image: &str) -> Self {
        ServiceSpec {
            name: name.to_string(),
            container_name: container_name.to_string(),
            image: image.to_string(),
            env: Vec::new(),
            mounts: Vec::new(),
            static_address: None,
            join_proxy_network: false,
            dns_server: None,
            labels: Vec::new(),
            ports: Vec::new(),
            probe: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_mount(mut self, host_path: String, container_path: &str) -> Self {
        self.mounts.push(MountSpec {
            host_path,
            container_path: container_path.to_string(),
            read_only: false,
        });
        self
    }

    pub fn with_mount_ro(mut self, host_path: String, container_path: &str) -> Self {
        self.mounts.push(MountSpec {
            host_path,
            container_path: container_path.to_string(),
            read_only: true,
        });
        self
    }

    pub fn with_static_address(mut self, address: &str) -> Self {
        self.static_address = Some(address.to_string());
        self
    }

    pub fn with_dns(mut self, resolver: &str) -> Self {
        self.dns_server = Some(resolver.to_string());
        self
    }

    pub fn with_labels(mut self, labels: Vec<(String, String)>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_port(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }

    pub fn with_probe(mut self, probe: ProbeSpec) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn joins_proxy_network(mut self) -> Self {
        self.join_proxy_network = true;
        self
    }

    pub fn depends_on(mut self, prerequisites: &[&str]) -> Self {
        self.depends_on = prerequisites.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// A network the deployment uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Pinned subnet for sequencer-owned networks.
    pub subnet: Option<String>,
    /// Externally managed: must pre-exist (or be created, per policy)
    /// rather than being destroyed and recreated.
    pub external: bool,
}

/// The whole declared deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployPlan {
    pub networks: Vec<NetworkSpec>,
    pub services: Vec<ServiceSpec>,
}

impl DeployPlan {
    /// Look a service up by short name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Every declared container name, in declaration order.
    pub fn container_names(&self) -> Vec<&str> {
        self.services
            .iter()
            .map(|s| s.container_name.as_str())
            .collect()
    }

    /// Every distinct image reference, in first-use order.
    pub fn image_refs(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for service in &self.services {
            if !seen.contains(&service.image.as_str()) {
                seen.push(service.image.as_str());
            }
        }
        seen
    }

    /// Deterministic SHA-256 digest of the ordered service list and image
    /// references; logged with every run for traceability.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for service in &self.services {
            hasher.update(service.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(service.image.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Environment every application-tier container receives.
fn base_env(config: &DeployConfig) -> Vec<(String, String)> {
    vec![
        ("DOMAIN".to_string(), config.domain.clone()),
        ("HOSTNAMES".to_string(), config.hostnames.join(",")),
        ("POSTMASTER".to_string(), config.postmaster.clone()),
        ("SECRET_KEY".to_string(), config.secret_key.clone()),
        (
            "REDIS_ADDRESS".to_string(),
            config.container_name("cache"),
        ),
        ("SUBNET".to_string(), config.network_subnet.clone()),
    ]
}

/// Environment contract of the forward-authentication side-car.
fn forward_auth_env(config: &DeployConfig, auth: &ForwardAuthConfig) -> Vec<(String, String)> {
    vec![
        ("DEFAULT_PROVIDER".to_string(), "oidc".to_string()),
        (
            "PROVIDERS_OIDC_ISSUER_URL".to_string(),
            auth.issuer_url.clone(),
        ),
        (
            "PROVIDERS_OIDC_CLIENT_ID".to_string(),
            auth.client_id.clone(),
        ),
        (
            "PROVIDERS_OIDC_CLIENT_SECRET".to_string(),
            auth.client_secret.clone(),
        ),
        ("SECRET".to_string(), config.secret_key.clone()),
        ("AUTH_HOST".to_string(), auth.auth_host.clone()),
        ("COOKIE_DOMAIN".to_string(), auth.cookie_domain.clone()),
        (
            "LIFETIME".to_string(),
            auth.lifetime_secs.to_string(),
        ),
    ]
}

fn data_path(config: &DeployConfig, subdir: &str) -> String {
    config.data_dir.join(subdir).to_string_lossy().to_string()
}

/// Declare the fixed mail stack for the given configuration.
///
/// Infrastructure first (resolver, cache), the optional auth side-car, then
/// the application tier pinned to the resolver via `--dns`, and the
/// internet-facing front last, carrying the routing labels and the
/// proxy-network join.
pub fn mail_stack_plan(config: &DeployConfig) -> DeployPlan {
    let resolver_dns = config.resolver_address.clone();
    let env = base_env(config);

    let mut services = vec![
        ServiceSpec::new(
            "resolver",
            &config.container_name("resolver"),
            &config.image_ref("unbound"),
        )
        .with_static_address(&config.resolver_address)
        .with_mount(data_path(config, "dns"), "/etc/unbound/data")
        .with_probe(ProbeSpec::DnsLookup {
            lookup_name: "root-servers.net".to_string(),
        }),
        ServiceSpec::new("cache", &config.container_name("cache"), "redis:7-alpine")
            .with_mount(data_path(config, "redis"), "/data")
            .with_probe(ProbeSpec::CachePing),
    ];

    if let Some(ref auth) = config.forward_auth {
        services.push(
            ServiceSpec::new(
                "auth",
                &config.container_name("auth"),
                "thomseddon/traefik-forward-auth:2",
            )
            .with_env(forward_auth_env(config, auth))
            .with_labels(labels::forward_auth_labels(config))
            .joins_proxy_network()
            .with_probe(ProbeSpec::LogToken {
                token: "Listening on".to_string(),
            }),
        );
    }

    services.extend([
        ServiceSpec::new(
            "admin",
            &config.container_name("admin"),
            &config.image_ref("admin"),
        )
        .with_env(env.clone())
        .with_mount(data_path(config, "data"), "/data")
        .with_mount(data_path(config, "dkim"), "/dkim")
        .with_dns(&resolver_dns)
        .depends_on(&["resolver", "cache"]),
        ServiceSpec::new(
            "imap",
            &config.container_name("imap"),
            &config.image_ref("dovecot"),
        )
        .with_env(env.clone())
        .with_mount(data_path(config, "mail"), "/mail")
        .with_mount_ro(data_path(config, "overrides"), "/overrides")
        .with_dns(&resolver_dns)
        .depends_on(&["resolver", "admin"]),
        ServiceSpec::new(
            "smtp",
            &config.container_name("smtp"),
            &config.image_ref("postfix"),
        )
        .with_env(env.clone())
        .with_mount(data_path(config, "mailqueue"), "/queue")
        .with_mount_ro(data_path(config, "overrides"), "/overrides")
        .with_dns(&resolver_dns)
        .depends_on(&["resolver", "admin"]),
        ServiceSpec::new(
            "antispam",
            &config.container_name("antispam"),
            &config.image_ref("rspamd"),
        )
        .with_env(env.clone())
        .with_mount(data_path(config, "filter"), "/var/lib/rspamd")
        .with_mount_ro(data_path(config, "dkim"), "/dkim")
        .with_dns(&resolver_dns)
        .depends_on(&["resolver", "cache"]),
        ServiceSpec::new(
            "webmail",
            &config.container_name("webmail"),
            &config.image_ref("webmail"),
        )
        .with_env(env.clone())
        .with_mount(data_path(config, "webmail"), "/data")
        .with_dns(&resolver_dns)
        .depends_on(&["imap"]),
        ServiceSpec::new(
            "front",
            &config.container_name("front"),
            &config.image_ref("nginx"),
        )
        .with_env(env)
        .with_mount_ro(data_path(config, "certs"), "/certs")
        .with_mount_ro(data_path(config, "overrides"), "/overrides")
        .with_dns(&resolver_dns)
        .with_labels(labels::front_labels(config))
        .with_port(25, 25)
        .with_port(143, 143)
        .with_port(465, 465)
        .with_port(587, 587)
        .with_port(993, 993)
        .joins_proxy_network()
        .depends_on(&["admin", "imap", "smtp", "antispam", "webmail"]),
    ]);

    DeployPlan {
        networks: vec![
            NetworkSpec {
                name: config.network_name.clone(),
                subnet: Some(config.network_subnet.clone()),
                external: false,
            },
            NetworkSpec {
                name: config.proxy_network.clone(),
                subnet: None,
                external: true,
            },
        ],
        services,
    }
}
