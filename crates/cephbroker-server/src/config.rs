use cephbroker_backend::CephClientConfig;
use cephbroker_core::CatalogConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Broker settings. Every field may be omitted from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// `host:port` the broker API listens on.
    pub listen_addr: String,
    /// `host:port` of the ceph metadata server.
    pub mds: String,
    pub keyring_file: PathBuf,
    /// Directory holding the registry state file.
    pub data_dir: PathBuf,
    pub service_name: String,
    pub service_id: String,
    pub plan_name: String,
    pub plan_id: String,
    pub plan_desc: String,
    /// Local directory the filesystem is mounted at on the broker host.
    pub base_mount_path: PathBuf,
    /// Directory on the ceph filesystem that shares are created under.
    pub base_remote_mount_path: String,
    /// Number of HTTP worker threads.
    pub workers: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8999".to_owned(),
            mds: "10.0.0.106:6789".to_owned(),
            keyring_file: PathBuf::from("/etc/ceph/ceph.client.admin.keyring"),
            data_dir: PathBuf::from("/tmp/cephbroker"),
            service_name: "cephfs".to_owned(),
            service_id: "cephfs-service-guid".to_owned(),
            plan_name: "free".to_owned(),
            plan_id: "free-plan-guid".to_owned(),
            plan_desc: "free ceph filesystem".to_owned(),
            base_mount_path: PathBuf::from("/tmp/share"),
            base_remote_mount_path: "/".to_owned(),
            workers: 4,
        }
    }
}

impl BrokerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_owned()));
        }
        if self.service_name.is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".to_owned()));
        }
        if self.listen_addr.is_empty() {
            return Err(ConfigError::Invalid("listen_addr must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn catalog(&self) -> CatalogConfig {
        CatalogConfig {
            service_name: self.service_name.clone(),
            service_id: self.service_id.clone(),
            plan_name: self.plan_name.clone(),
            plan_id: self.plan_id.clone(),
            plan_desc: self.plan_desc.clone(),
        }
    }

    pub fn client_config(&self) -> CephClientConfig {
        CephClientConfig {
            mds: self.mds.clone(),
            keyring_file: self.keyring_file.clone(),
            local_mount_dir: self.base_mount_path.clone(),
            remote_mount_path: self.base_remote_mount_path.clone(),
        }
    }
}
