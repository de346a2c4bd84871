use crate::model::{BindDetails, Binding, ProvisionDetails};
use crate::StateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// A binding as registered: the request, its instance and the result handed out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingRecord {
    pub instance_id: String,
    pub details: BindDetails,
    pub binding: Binding,
}

/// Everything the broker knows to exist. Serialized as one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    #[serde(default)]
    pub instances: BTreeMap<String, ProvisionDetails>,
    #[serde(default)]
    pub bindings: BTreeMap<String, BindingRecord>,
}

impl Registry {
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.bindings.is_empty()
    }
}

/// The `<data_dir>/<service_name>-services.json` file holding the registry.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(data_dir: &Path, service_name: &str) -> Self {
        Self {
            path: data_dir.join(format!("{service_name}-services.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry; `Ok(None)` if the file has never been written.
    pub fn load(&self) -> Result<Option<Registry>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Load for startup: any problem is logged and yields an empty registry.
    pub fn restore(&self) -> Registry {
        match self.load() {
            Ok(Some(registry)) => {
                info!(
                    "restored {} instance(s) and {} binding(s) from {}",
                    registry.instances.len(),
                    registry.bindings.len(),
                    self.path.display()
                );
                registry
            }
            Ok(None) => {
                info!("no state file at {}, starting empty", self.path.display());
                Registry::default()
            }
            Err(e) => {
                warn!(
                    "failed to restore state from {}, starting empty: {e}",
                    self.path.display()
                );
                Registry::default()
            }
        }
    }

    /// Overwrite the file with `registry`, atomically.
    pub fn save(&self, registry: &Registry) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(registry)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StateError::Io(e.error))?;
        fs::File::open(&dir)?.sync_all()?;

        info!("state saved to {}", self.path.display());
        Ok(())
    }
}
