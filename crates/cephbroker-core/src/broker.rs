use crate::catalog::{CatalogConfig, ServiceCatalog};
use crate::controller::Controller;
use crate::model::{BindDetails, BindOptions, Binding, ProvisionDetails};
use crate::state::{BindingRecord, Registry, StateFile};
use crate::BrokerError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

/// Result of a successful provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provisioned {
    /// The instance was already registered with identical details.
    pub already_existed: bool,
}

/// Result of a successful bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub binding: Binding,
    /// The binding was already registered with identical details and
    /// `binding` is the result handed out the first time.
    pub already_existed: bool,
}

/// The lifecycle state manager.
///
/// Every mutating operation holds the registry lock for its whole duration,
/// backend call and state file write included, so operations are applied one
/// at a time in arrival order. The state file is rewritten when each mutating
/// call finishes, whether it succeeded or not. A failed write is logged and
/// does not fail the call.
pub struct Broker {
    controller: Arc<dyn Controller>,
    catalog: ServiceCatalog,
    state_file: StateFile,
    registry: Mutex<Registry>,
}

impl Broker {
    /// Create a broker and restore its registry from `data_dir`.
    pub fn new(controller: Arc<dyn Controller>, catalog: &CatalogConfig, data_dir: &Path) -> Self {
        let state_file = StateFile::new(data_dir, &catalog.service_name);
        let registry = state_file.restore();
        Self {
            controller,
            catalog: ServiceCatalog::new(catalog),
            state_file,
            registry: Mutex::new(registry),
        }
    }

    pub fn services(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn state_file(&self) -> &StateFile {
        &self.state_file
    }

    pub fn instance_exists(&self, instance_id: &str) -> bool {
        self.lock().instances.contains_key(instance_id)
    }

    pub fn binding_exists(&self, instance_id: &str, binding_id: &str) -> bool {
        self.lock()
            .bindings
            .get(binding_id)
            .is_some_and(|b| b.instance_id == instance_id)
    }

    /// Copy of the current registry.
    pub fn snapshot(&self) -> Registry {
        self.lock().clone()
    }

    pub fn provision(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
    ) -> Result<Provisioned, BrokerError> {
        self.mutate("provision", instance_id, |registry| {
            if let Some(existing) = registry.instances.get(instance_id) {
                if existing.same_request(&details) {
                    info!("instance {instance_id} already provisioned with identical details");
                    return Ok(Provisioned {
                        already_existed: true,
                    });
                }
                return Err(BrokerError::AlreadyExists(format!(
                    "service instance '{instance_id}'"
                )));
            }

            self.controller.create(instance_id)?;
            registry.instances.insert(instance_id.to_owned(), details);
            Ok(Provisioned {
                already_existed: false,
            })
        })
    }

    /// Remove an instance's share and forget it, along with its bindings.
    pub fn deprovision(&self, instance_id: &str) -> Result<(), BrokerError> {
        self.mutate("deprovision", instance_id, |registry| {
            if !registry.instances.contains_key(instance_id) {
                return Err(BrokerError::InstanceNotFound(instance_id.to_owned()));
            }

            self.controller.remove(instance_id)?;
            registry.instances.remove(instance_id);

            let before = registry.bindings.len();
            registry.bindings.retain(|_, b| b.instance_id != instance_id);
            let dropped = before - registry.bindings.len();
            if dropped > 0 {
                info!("dropped {dropped} binding(s) of deprovisioned instance {instance_id}");
            }
            Ok(())
        })
    }

    pub fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
    ) -> Result<Bound, BrokerError> {
        self.mutate("bind", instance_id, |registry| {
            if !registry.instances.contains_key(instance_id) {
                return Err(BrokerError::InstanceNotFound(instance_id.to_owned()));
            }
            if details.app_guid.is_empty() {
                return Err(BrokerError::InvalidRequest(
                    "app_guid must be provided".to_owned(),
                ));
            }
            let options = BindOptions::from_parameters(&details.parameters)?;

            if let Some(existing) = registry.bindings.get(binding_id) {
                if existing.instance_id == instance_id && existing.details.same_request(&details)
                {
                    info!("binding {binding_id} already exists with identical details");
                    return Ok(Bound {
                        binding: existing.binding.clone(),
                        already_existed: true,
                    });
                }
                return Err(BrokerError::AlreadyExists(format!(
                    "service binding '{binding_id}'"
                )));
            }

            let device = self.controller.bind(instance_id)?;
            let binding = Binding::shared_volume(device, &options);
            registry.bindings.insert(
                binding_id.to_owned(),
                BindingRecord {
                    instance_id: instance_id.to_owned(),
                    details,
                    binding: binding.clone(),
                },
            );
            Ok(Bound {
                binding,
                already_existed: false,
            })
        })
    }

    /// Forget a binding. The share itself is left alone.
    pub fn unbind(&self, instance_id: &str, binding_id: &str) -> Result<(), BrokerError> {
        self.mutate("unbind", instance_id, |registry| {
            if !registry.instances.contains_key(instance_id) {
                return Err(BrokerError::InstanceNotFound(instance_id.to_owned()));
            }
            let registered = registry
                .bindings
                .get(binding_id)
                .is_some_and(|b| b.instance_id == instance_id);
            if !registered {
                return Err(BrokerError::BindingNotFound(binding_id.to_owned()));
            }
            registry.bindings.remove(binding_id);
            Ok(())
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T>(
        &self,
        op: &str,
        instance_id: &str,
        f: impl FnOnce(&mut Registry) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        info!("{op} {instance_id}: start");
        let mut registry = self.lock();
        let result = f(&mut registry);
        if let Err(e) = self.state_file.save(&registry) {
            error!(
                "failed to write state file {}: {e}",
                self.state_file.path().display()
            );
        }
        drop(registry);

        match &result {
            Ok(_) => info!("{op} {instance_id}: end"),
            Err(e) => warn!("{op} {instance_id}: failed: {e}"),
        }
        result
    }
}
