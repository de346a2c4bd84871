use serde::{Deserialize, Serialize};

pub const SERVICE_DESCRIPTION: &str =
    "CephFS service docs: https://code.cloudfoundry.org/cephfs-bosh-release/";

/// Permission a platform must grant before it can use the binding's volume mounts.
pub const PERMISSION_VOLUME_MOUNT: &str = "volume_mount";

/// Names and ids under which the broker advertises its single service and plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub service_name: String,
    pub service_id: String,
    pub plan_name: String,
    pub plan_id: String,
    pub plan_desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub free: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub tags: Vec<String>,
    pub requires: Vec<String>,
    pub plans: Vec<ServicePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCatalog {
    pub services: Vec<Service>,
}

impl ServiceCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            services: vec![Service {
                id: config.service_id.clone(),
                name: config.service_name.clone(),
                description: SERVICE_DESCRIPTION.to_owned(),
                bindable: true,
                plan_updateable: false,
                tags: vec!["ceph".to_owned()],
                requires: vec![PERMISSION_VOLUME_MOUNT.to_owned()],
                plans: vec![ServicePlan {
                    id: config.plan_id.clone(),
                    name: config.plan_name.clone(),
                    description: config.plan_desc.clone(),
                    free: true,
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_advertises_configured_service_and_plan() {
        let catalog = ServiceCatalog::new(&CatalogConfig {
            service_name: "service-name".to_owned(),
            service_id: "service-id".to_owned(),
            plan_name: "plan-name".to_owned(),
            plan_id: "plan-id".to_owned(),
            plan_desc: "plan-desc".to_owned(),
        });

        let service = &catalog.services[0];
        assert_eq!(service.id, "service-id");
        assert_eq!(service.name, "service-name");
        assert_eq!(service.description, SERVICE_DESCRIPTION);
        assert!(service.bindable);
        assert!(!service.plan_updateable);
        assert!(service.tags.contains(&"ceph".to_owned()));
        assert!(service.requires.contains(&"volume_mount".to_owned()));

        let plan = &service.plans[0];
        assert_eq!(plan.name, "plan-name");
        assert_eq!(plan.id, "plan-id");
        assert_eq!(plan.description, "plan-desc");
    }
}
