//! Dependency-ordered start scheduling.
//!
//! The plan declares prerequisites per service; this module derives the
//! sequential start order from that graph. Declaration order is preserved
//! among services whose prerequisites are already satisfied, so the plan
//! author still controls ties.

use std::collections::HashSet;

use maildock_core::{DeployError, DeployPlan, ServiceSpec};

/// Resolve the sequential start order for a plan.
///
/// Errors on a dependency naming no declared service and on cycles.
pub fn start_order(plan: &DeployPlan) -> Result<Vec<&ServiceSpec>, DeployError> {
    for service in &plan.services {
        for dependency in &service.depends_on {
            if plan.service(dependency).is_none() {
                return Err(DeployError::UnknownDependency {
                    service: service.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut order: Vec<&ServiceSpec> = Vec::with_capacity(plan.services.len());
    let mut scheduled: HashSet<&str> = HashSet::new();

    while order.len() < plan.services.len() {
        let mut progressed = false;
        for service in &plan.services {
            if scheduled.contains(service.name.as_str()) {
                continue;
            }
            let satisfied = service
                .depends_on
                .iter()
                .all(|dep| scheduled.contains(dep.as_str()));
            if satisfied {
                scheduled.insert(&service.name);
                order.push(service);
                progressed = true;
            }
        }
        if !progressed {
            let stuck = plan
                .services
                .iter()
                .find(|s| !scheduled.contains(s.name.as_str()))
                .expect("unscheduled service must exist when no progress is made");
            return Err(DeployError::DependencyCycle(stuck.name.clone()));
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maildock_core::config::{DeployConfig, EnvFile};
    use maildock_core::plan::{mail_stack_plan, DeployPlan, NetworkSpec, ServiceSpec};

    fn config() -> DeployConfig {
        let env = EnvFile::parse(
            "SECRET_KEY=0123456789abcdef0123456789abcdef\nDOMAIN=example.com\n\
             HOSTNAMES=mail.example.com\nPOSTMASTER=admin",
        );
        DeployConfig::from_env_file(&env).unwrap()
    }

    fn position(order: &[&ServiceSpec], name: &str) -> usize {
        order.iter().position(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_mail_stack_order_respects_dependencies() {
        let plan = mail_stack_plan(&config());
        let order = start_order(&plan).unwrap();

        assert_eq!(order.len(), plan.services.len());
        assert!(position(&order, "resolver") < position(&order, "admin"));
        assert!(position(&order, "cache") < position(&order, "admin"));
        assert!(position(&order, "admin") < position(&order, "imap"));
        assert!(position(&order, "imap") < position(&order, "webmail"));
        assert_eq!(order.last().unwrap().name, "front");
    }

    #[test]
    fn test_declaration_order_preserved_for_independents() {
        let plan = DeployPlan {
            networks: vec![NetworkSpec {
                name: "net".to_string(),
                subnet: None,
                external: false,
            }],
            services: vec![
                ServiceSpec::new("b", "x-b", "img"),
                ServiceSpec::new("a", "x-a", "img"),
            ],
        };
        let order = start_order(&plan).unwrap();
        assert_eq!(order[0].name, "b");
        assert_eq!(order[1].name, "a");
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let plan = DeployPlan {
            networks: Vec::new(),
            services: vec![ServiceSpec::new("web", "x-web", "img").depends_on(&["database"])],
        };
        let err = start_order(&plan).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UnknownDependency { ref service, ref dependency }
                if service == "web" && dependency == "database"
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let plan = DeployPlan {
            networks: Vec::new(),
            services: vec![
                ServiceSpec::new("a", "x-a", "img").depends_on(&["b"]),
                ServiceSpec::new("b", "x-b", "img").depends_on(&["a"]),
            ],
        };
        let err = start_order(&plan).unwrap_err();
        assert!(matches!(err, DeployError::DependencyCycle(_)));
    }
}
