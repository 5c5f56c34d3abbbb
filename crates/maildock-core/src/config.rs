//! Deployment configuration: env-file loading, defaults, validation.
//!
//! The configuration is loaded once into an immutable [`DeployConfig`] and
//! passed by reference into every component; nothing mutates process-wide
//! environment state. Validation runs before any container-mutating command
//! is issued.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Length every secret key must have, exactly.
pub const SECRET_KEY_LEN: usize = 32;

/// Parsed `KEY=VALUE` configuration source.
///
/// Accepts the shell-sourced env-file dialect: blank lines and `#` comments
/// are skipped, a leading `export ` is tolerated, and single or double
/// quotes around a value are stripped.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    /// Load and parse an env file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse env-file content from a string.
    pub fn parse(content: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_string();
                if key.is_empty() {
                    continue;
                }
                entries.insert(key, strip_quotes(value.trim()).to_string());
            }
        }
        EnvFile { entries }
    }

    /// Raw value for a key, if present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("cannot parse `{}`", raw),
            }),
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// What to do when the externally-managed proxy network is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyNetworkPolicy {
    /// Abort the run; the proxy deployment owns that network.
    RequireExisting,
    /// Create it without a pinned subnet and continue.
    CreateIfMissing,
}

impl ProxyNetworkPolicy {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "require" => Ok(ProxyNetworkPolicy::RequireExisting),
            "create" => Ok(ProxyNetworkPolicy::CreateIfMissing),
            other => Err(ConfigError::InvalidValue {
                key: "PROXY_NETWORK_POLICY".to_string(),
                reason: format!("expected `require` or `create`, got `{}`", other),
            }),
        }
    }
}

/// Environment contract of the forward-authentication side-car.
///
/// Present only when `OIDC_ISSUER_URL` is configured; the remaining client
/// credentials then become required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardAuthConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Dedicated hostname the side-car answers on.
    pub auth_host: String,
    /// Domain scope of the session cookie.
    pub cookie_domain: String,
    /// Response headers forwarded to the protected service.
    pub response_headers: Vec<String>,
    /// Session lifetime in seconds.
    pub lifetime_secs: u64,
}

impl ForwardAuthConfig {
    fn from_env(env: &EnvFile) -> Result<Option<Self>, ConfigError> {
        let issuer_url = match env.get("OIDC_ISSUER_URL") {
            Some(url) => url.to_string(),
            // Side-car not configured: the feature is skipped, not an error.
            None => return Ok(None),
        };

        let response_headers = env
            .get_or("AUTH_RESPONSE_HEADERS", "X-Forwarded-User")
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        Ok(Some(ForwardAuthConfig {
            issuer_url,
            client_id: env.require("OIDC_CLIENT_ID")?,
            client_secret: env.require("OIDC_CLIENT_SECRET")?,
            auth_host: env.require("AUTH_HOST")?,
            cookie_domain: env.require("COOKIE_DOMAIN")?,
            response_headers,
            lifetime_secs: env.get_parsed("AUTH_LIFETIME_SECS", 43_200)?,
        }))
    }
}

/// Immutable configuration record for one sequencer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// 32-character application secret shared by the stack.
    pub secret_key: String,
    /// Primary mail domain.
    pub domain: String,
    /// Public hostnames, first entry is primary.
    pub hostnames: Vec<String>,
    /// Postmaster address (local part or full address).
    pub postmaster: String,

    /// Base directory for persistent host data.
    pub data_dir: PathBuf,
    /// Numeric owner applied to the data tree, best effort.
    pub data_uid: u32,
    pub data_gid: u32,

    /// Container name prefix: containers are named `{prefix}-{service}`.
    pub name_prefix: String,
    /// Internal service network.
    pub network_name: String,
    pub network_subnet: String,
    /// Static address of the DNS resolver on the internal network.
    pub resolver_address: String,
    /// Externally-managed reverse-proxy network.
    pub proxy_network: String,
    pub proxy_network_policy: ProxyNetworkPolicy,

    /// Image coordinates: `{registry}/{org}/{image}:{tag}`.
    pub registry: String,
    pub registry_org: String,
    pub version_tag: String,

    /// TLS certificate resolver name declared in routing labels.
    pub tls_resolver: String,

    /// Readiness polling cadence.
    pub poll_interval_secs: u64,
    pub poll_budget_ticks: u64,
    /// Settle period before the final status snapshot.
    pub settle_secs: u64,

    /// Optional forward-authentication side-car.
    pub forward_auth: Option<ForwardAuthConfig>,
}

impl DeployConfig {
    /// Load, default, and validate a configuration from an env file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let env = EnvFile::load(path)?;
        let config = Self::from_env_file(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the record from a parsed env file, applying defaults for every
    /// optional key. Presence/shape checks live in [`DeployConfig::validate`].
    pub fn from_env_file(env: &EnvFile) -> Result<Self, ConfigError> {
        let hostnames = env
            .get_or("HOSTNAMES", "")
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        let policy = match env.get("PROXY_NETWORK_POLICY") {
            Some(raw) => ProxyNetworkPolicy::parse(raw)?,
            None => ProxyNetworkPolicy::RequireExisting,
        };

        Ok(DeployConfig {
            secret_key: env.get_or("SECRET_KEY", ""),
            domain: env.get_or("DOMAIN", ""),
            hostnames,
            postmaster: env.get_or("POSTMASTER", ""),

            data_dir: PathBuf::from(env.get_or("DATA_DIR", "/srv/maildock")),
            data_uid: env.get_parsed("DATA_UID", 1000)?,
            data_gid: env.get_parsed("DATA_GID", 1000)?,

            name_prefix: env.get_or("NAME_PREFIX", "maildock"),
            network_name: env.get_or("NETWORK_NAME", "maildock"),
            network_subnet: env.get_or("NETWORK_SUBNET", "192.168.203.0/24"),
            resolver_address: env.get_or("RESOLVER_ADDRESS", "192.168.203.254"),
            proxy_network: env.get_or("PROXY_NETWORK", "proxy"),
            proxy_network_policy: policy,

            registry: env.get_or("REGISTRY", "ghcr.io"),
            registry_org: env.get_or("REGISTRY_ORG", "maildock"),
            version_tag: env.get_or("VERSION_TAG", "2.0"),

            tls_resolver: env.get_or("TLS_RESOLVER", "letsencrypt"),

            poll_interval_secs: env.get_parsed("POLL_INTERVAL_SECS", 2)?,
            poll_budget_ticks: env.get_parsed("POLL_BUDGET_TICKS", 60)?,
            settle_secs: env.get_parsed("SETTLE_SECS", 5)?,

            forward_auth: ForwardAuthConfig::from_env(env)?,
        })
    }

    /// Reject malformed configuration before any runtime mutation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingKey("SECRET_KEY".to_string()));
        }
        if self.secret_key.chars().count() != SECRET_KEY_LEN {
            return Err(ConfigError::SecretLength {
                expected: SECRET_KEY_LEN,
                actual: self.secret_key.chars().count(),
            });
        }
        if self.domain.is_empty() {
            return Err(ConfigError::MissingKey("DOMAIN".to_string()));
        }
        if self.hostnames.is_empty() {
            return Err(ConfigError::MissingKey("HOSTNAMES".to_string()));
        }
        if self.postmaster.is_empty() {
            return Err(ConfigError::MissingKey("POSTMASTER".to_string()));
        }
        Ok(())
    }

    /// Primary public hostname (first HOSTNAMES entry).
    pub fn primary_hostname(&self) -> &str {
        &self.hostnames[0]
    }

    /// Container name for a service: `{prefix}-{service}`.
    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{}", self.name_prefix, service)
    }

    /// Fully-qualified image reference for a stack image.
    pub fn image_ref(&self, image: &str) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry, self.registry_org, image, self.version_tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_env() -> String {
        [
            "SECRET_KEY=0123456789abcdef0123456789abcdef",
            "DOMAIN=example.com",
            "HOSTNAMES=mail.example.com,webmail.example.com",
            "POSTMASTER=admin",
        ]
        .join("\n")
    }

    #[test]
    fn test_env_file_parse_dialect() {
        let env = EnvFile::parse(
            "# comment\n\nexport DOMAIN=example.com\nSECRET_KEY=\"abc\"\nEMPTY=\nQUOTED='v'\n",
        );
        assert_eq!(env.get("DOMAIN"), Some("example.com"));
        assert_eq!(env.get("SECRET_KEY"), Some("abc"));
        assert_eq!(env.get("QUOTED"), Some("v"));
        // Empty values behave as absent
        assert_eq!(env.get("EMPTY"), None);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EnvFile::load(Path::new("/nonexistent/maildock.env"));
        assert!(matches!(result, Err(ConfigError::MissingFile(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maildock.env");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(minimal_env().as_bytes()).unwrap();

        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.hostnames.len(), 2);
        assert_eq!(config.primary_hostname(), "mail.example.com");
    }

    #[test]
    fn test_defaults_applied() {
        let env = EnvFile::parse(&minimal_env());
        let config = DeployConfig::from_env_file(&env).unwrap();

        assert_eq!(config.name_prefix, "maildock");
        assert_eq!(config.network_subnet, "192.168.203.0/24");
        assert_eq!(config.resolver_address, "192.168.203.254");
        assert_eq!(config.proxy_network_policy, ProxyNetworkPolicy::RequireExisting);
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.poll_budget_ticks, 60);
        assert!(config.forward_auth.is_none());
    }

    #[test]
    fn test_secret_length_boundaries() {
        for (len, ok) in [(31, false), (32, true), (33, false)] {
            let env = EnvFile::parse(&format!(
                "SECRET_KEY={}\nDOMAIN=example.com\nHOSTNAMES=mail.example.com\nPOSTMASTER=admin",
                "x".repeat(len)
            ));
            let result = DeployConfig::from_env_file(&env).unwrap().validate();
            if ok {
                assert!(result.is_ok(), "length {} should pass", len);
            } else {
                assert!(
                    matches!(result, Err(ConfigError::SecretLength { actual, .. }) if actual == len),
                    "length {} should fail",
                    len
                );
            }
        }
    }

    #[test]
    fn test_missing_required_keys_rejected() {
        for missing in ["SECRET_KEY", "DOMAIN", "HOSTNAMES", "POSTMASTER"] {
            let content: String = minimal_env()
                .lines()
                .filter(|line| !line.starts_with(missing))
                .collect::<Vec<_>>()
                .join("\n");
            let env = EnvFile::parse(&content);
            let result = DeployConfig::from_env_file(&env).unwrap().validate();
            assert!(
                matches!(result, Err(ConfigError::MissingKey(ref key)) if key == missing),
                "expected MissingKey({})",
                missing
            );
        }
    }

    #[test]
    fn test_forward_auth_block_requires_credentials() {
        let content = format!("{}\nOIDC_ISSUER_URL=https://id.example.com", minimal_env());
        let env = EnvFile::parse(&content);
        let result = DeployConfig::from_env_file(&env);
        assert!(matches!(result, Err(ConfigError::MissingKey(ref key)) if key == "OIDC_CLIENT_ID"));
    }

    #[test]
    fn test_forward_auth_block_complete() {
        let content = format!(
            "{}\nOIDC_ISSUER_URL=https://id.example.com\nOIDC_CLIENT_ID=maildock\n\
             OIDC_CLIENT_SECRET=s3cret\nAUTH_HOST=auth.example.com\nCOOKIE_DOMAIN=example.com",
            minimal_env()
        );
        let env = EnvFile::parse(&content);
        let config = DeployConfig::from_env_file(&env).unwrap();
        let auth = config.forward_auth.expect("side-car configured");
        assert_eq!(auth.auth_host, "auth.example.com");
        assert_eq!(auth.lifetime_secs, 43_200);
        assert_eq!(auth.response_headers, vec!["X-Forwarded-User"]);
    }

    #[test]
    fn test_proxy_network_policy_parse() {
        let content = format!("{}\nPROXY_NETWORK_POLICY=create", minimal_env());
        let config = DeployConfig::from_env_file(&EnvFile::parse(&content)).unwrap();
        assert_eq!(
            config.proxy_network_policy,
            ProxyNetworkPolicy::CreateIfMissing
        );

        let content = format!("{}\nPROXY_NETWORK_POLICY=maybe", minimal_env());
        assert!(matches!(
            DeployConfig::from_env_file(&EnvFile::parse(&content)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_container_name_and_image_ref() {
        let config = DeployConfig::from_env_file(&EnvFile::parse(&minimal_env())).unwrap();
        assert_eq!(config.container_name("smtp"), "maildock-smtp");
        assert_eq!(config.image_ref("postfix"), "ghcr.io/maildock/postfix:2.0");
    }
}
