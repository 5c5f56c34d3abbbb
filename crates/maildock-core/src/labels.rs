//! Reverse-proxy routing labels.
//!
//! The proxy derives its routing table from container metadata labels; the
//! sequencer only declares them and has no way to confirm the proxy applied
//! them. Label keys follow the traefik docker-provider contract: router
//! rule, entrypoint, TLS certificate resolver, backend port, and the
//! forward-auth middleware chain when the side-car is enabled.

use crate::config::DeployConfig;

/// Router host-match rule over every public hostname.
pub fn host_rule(hostnames: &[String]) -> String {
    hostnames
        .iter()
        .map(|h| format!("Host(`{}`)", h))
        .collect::<Vec<_>>()
        .join(" || ")
}

fn label(key: String, value: String) -> (String, String) {
    (key, value)
}

/// Labels for the internet-facing front container.
pub fn front_labels(config: &DeployConfig) -> Vec<(String, String)> {
    let router = format!("{}-web", config.name_prefix);
    let mut labels = vec![
        label("traefik.enable".to_string(), "true".to_string()),
        label(
            "traefik.docker.network".to_string(),
            config.proxy_network.clone(),
        ),
        label(
            format!("traefik.http.routers.{}.rule", router),
            host_rule(&config.hostnames),
        ),
        label(
            format!("traefik.http.routers.{}.entrypoints", router),
            "websecure".to_string(),
        ),
        label(
            format!("traefik.http.routers.{}.tls.certresolver", router),
            config.tls_resolver.clone(),
        ),
        label(
            format!("traefik.http.services.{}.loadbalancer.server.port", router),
            "80".to_string(),
        ),
    ];

    if let Some(ref auth) = config.forward_auth {
        let middleware = format!("{}-auth", config.name_prefix);
        labels.push(label(
            format!("traefik.http.routers.{}.middlewares", router),
            middleware.clone(),
        ));
        labels.push(label(
            format!("traefik.http.middlewares.{}.forwardauth.address", middleware),
            format!("http://{}:4181", config.container_name("auth")),
        ));
        labels.push(label(
            format!(
                "traefik.http.middlewares.{}.forwardauth.authResponseHeaders",
                middleware
            ),
            auth.response_headers.join(","),
        ));
        labels.push(label(
            format!(
                "traefik.http.middlewares.{}.forwardauth.trustForwardHeader",
                middleware
            ),
            "true".to_string(),
        ));
    }

    labels
}

/// Labels for the forward-authentication side-car itself: the proxy routes
/// the dedicated auth hostname to it so the OIDC redirect flow can land.
pub fn forward_auth_labels(config: &DeployConfig) -> Vec<(String, String)> {
    let auth = match config.forward_auth {
        Some(ref auth) => auth,
        None => return Vec::new(),
    };
    let router = format!("{}-oidc", config.name_prefix);
    vec![
        label("traefik.enable".to_string(), "true".to_string()),
        label(
            "traefik.docker.network".to_string(),
            config.proxy_network.clone(),
        ),
        label(
            format!("traefik.http.routers.{}.rule", router),
            format!("Host(`{}`)", auth.auth_host),
        ),
        label(
            format!("traefik.http.routers.{}.entrypoints", router),
            "websecure".to_string(),
        ),
        label(
            format!("traefik.http.routers.{}.tls.certresolver", router),
            config.tls_resolver.clone(),
        ),
        label(
            format!("traefik.http.services.{}.loadbalancer.server.port", router),
            "4181".to_string(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeployConfig, EnvFile};

    fn config_with_auth() -> DeployConfig {
        let env = EnvFile::parse(
            "SECRET_KEY=0123456789abcdef0123456789abcdef\nDOMAIN=example.com\n\
             HOSTNAMES=mail.example.com,webmail.example.com\nPOSTMASTER=admin\n\
             OIDC_ISSUER_URL=https://id.example.com\nOIDC_CLIENT_ID=maildock\n\
             OIDC_CLIENT_SECRET=s3cret\nAUTH_HOST=auth.example.com\nCOOKIE_DOMAIN=example.com",
        );
        DeployConfig::from_env_file(&env).unwrap()
    }

    fn value_of<'a>(labels: &'a [(String, String)], key: &str) -> Option<&'a str> {
        labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_host_rule_joins_hostnames() {
        let rule = host_rule(&[
            "mail.example.com".to_string(),
            "webmail.example.com".to_string(),
        ]);
        assert_eq!(rule, "Host(`mail.example.com`) || Host(`webmail.example.com`)");
    }

    #[test]
    fn test_front_labels_without_auth_have_no_middleware() {
        let env = EnvFile::parse(
            "SECRET_KEY=0123456789abcdef0123456789abcdef\nDOMAIN=example.com\n\
             HOSTNAMES=mail.example.com\nPOSTMASTER=admin",
        );
        let config = DeployConfig::from_env_file(&env).unwrap();
        let labels = front_labels(&config);

        assert_eq!(value_of(&labels, "traefik.enable"), Some("true"));
        assert_eq!(
            value_of(&labels, "traefik.http.routers.maildock-web.rule"),
            Some("Host(`mail.example.com`)")
        );
        assert_eq!(
            value_of(
                &labels,
                "traefik.http.routers.maildock-web.tls.certresolver"
            ),
            Some("letsencrypt")
        );
        assert!(labels.iter().all(|(k, _)| !k.contains("middlewares")));
    }

    #[test]
    fn test_front_labels_with_auth_declare_middleware_chain() {
        let labels = front_labels(&config_with_auth());
        assert_eq!(
            value_of(&labels, "traefik.http.routers.maildock-web.middlewares"),
            Some("maildock-auth")
        );
        assert_eq!(
            value_of(
                &labels,
                "traefik.http.middlewares.maildock-auth.forwardauth.address"
            ),
            Some("http://maildock-auth:4181")
        );
        assert_eq!(
            value_of(
                &labels,
                "traefik.http.middlewares.maildock-auth.forwardauth.authResponseHeaders"
            ),
            Some("X-Forwarded-User")
        );
    }

    #[test]
    fn test_forward_auth_labels_route_auth_host() {
        let labels = forward_auth_labels(&config_with_auth());
        assert_eq!(
            value_of(&labels, "traefik.http.routers.maildock-oidc.rule"),
            Some("Host(`auth.example.com`)")
        );
        assert_eq!(
            value_of(
                &labels,
                "traefik.http.services.maildock-oidc.loadbalancer.server.port"
            ),
            Some("4181")
        );
    }
}
