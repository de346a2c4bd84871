//! Lifecycle core of the CephFS service broker.
//!
//! The [`Broker`] owns the registry of provisioned instances and bindings,
//! serializes every mutation behind one lock, drives the backend through a
//! [`Controller`], and rewrites the registry's state file after each call so
//! the broker picks up where it left off after a restart.

pub mod broker;
pub mod catalog;
pub mod controller;
pub mod model;
pub mod state;

pub use broker::{Bound, Broker, Provisioned};
pub use catalog::{CatalogConfig, Service, ServiceCatalog, ServicePlan};
pub use controller::{CephController, Controller};
pub use model::{
    BindDetails, BindOptions, Binding, MountConfig, MountMode, ProvisionDetails, SharedDevice,
    VolumeMount,
};
pub use state::{BindingRecord, Registry, StateFile};

use cephbroker_backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0} already exists with different attributes")]
    AlreadyExists(String),
    #[error("service instance '{0}' does not exist")]
    InstanceNotFound(String),
    #[error("service binding '{0}' does not exist")]
    BindingNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("{0}")]
    Backend(String),
}

impl From<BackendError> for BrokerError {
    fn from(e: BackendError) -> Self {
        BrokerError::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_keep_only_the_message() {
        let e: BrokerError = BackendError::ShareDelete("/tmp/share/x".to_owned()).into();
        assert!(matches!(e, BrokerError::Backend(_)));
        assert_eq!(e.to_string(), "failed to delete share '/tmp/share/x'");
    }

    #[test]
    fn broker_error_display_not_found() {
        let e = BrokerError::InstanceNotFound("inst".to_owned());
        assert!(e.to_string().contains("inst"));
        let e = BrokerError::BindingNotFound("bind".to_owned());
        assert!(e.to_string().contains("bind"));
    }
}
