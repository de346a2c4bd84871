use crate::invoker::{Invoker, ShellInvoker, CEPH_FUSE};
use crate::BackendError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Directory under which consumer cells mount a share.
pub const CELL_BASE_PATH: &str = "/var/vcap/data/volumes/ceph";

/// Where a share lives on the cluster and where a consumer mounts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePaths {
    pub remote: String,
    pub local: String,
}

/// Connection details handed to consumers of a share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// Metadata server address, `host:port`.
    pub mds: String,
    /// Raw keyring file contents.
    pub keyring: String,
}

/// The share operations the broker needs from the clustered filesystem.
pub trait BackendClient: Send + Sync {
    fn is_mounted(&self) -> bool;

    /// Mount `remote_root` of the filesystem at the local mount directory and
    /// return that directory.
    fn mount(&self, remote_root: &str) -> Result<PathBuf, BackendError>;

    fn create_share(&self, name: &str) -> Result<PathBuf, BackendError>;

    fn delete_share(&self, name: &str) -> Result<(), BackendError>;

    fn paths_for_share(&self, name: &str) -> Result<SharePaths, BackendError>;

    fn config_details(&self) -> Result<ConnectionDetails, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CephClientConfig {
    pub mds: String,
    pub keyring_file: PathBuf,
    pub local_mount_dir: PathBuf,
    pub remote_mount_path: String,
}

/// [`BackendClient`] for CephFS mounted through `ceph-fuse`.
///
/// Shares are plain directories below the local mount directory. The mounted
/// flag lives only in memory, so the first create after a restart mounts again.
pub struct CephClient {
    config: CephClientConfig,
    invoker: Arc<dyn Invoker>,
    mounted: AtomicBool,
}

impl CephClient {
    pub fn new(config: CephClientConfig) -> Self {
        Self::with_invoker(config, Arc::new(ShellInvoker))
    }

    pub fn with_invoker(config: CephClientConfig, invoker: Arc<dyn Invoker>) -> Self {
        Self {
            config,
            invoker,
            mounted: AtomicBool::new(false),
        }
    }

    fn share_path(&self, name: &str) -> Result<PathBuf, BackendError> {
        validate_share_name(name)?;
        Ok(self.config.local_mount_dir.join(name))
    }
}

/// A share name must be exactly one normal path component.
pub fn validate_share_name(name: &str) -> Result<(), BackendError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err(BackendError::InvalidShareName(name.to_owned())),
    }
}

impl BackendClient for CephClient {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn mount(&self, remote_root: &str) -> Result<PathBuf, BackendError> {
        let local = &self.config.local_mount_dir;
        info!("mounting {remote_root} at {}", local.display());

        if let Err(e) = fs::create_dir_all(local) {
            error!("failed to create local dir {}: {e}", local.display());
            return Err(BackendError::MountDirCreate(local.display().to_string()));
        }

        let args = vec![
            "-m".to_owned(),
            self.config.mds.clone(),
            "-k".to_owned(),
            self.config.keyring_file.display().to_string(),
            "-r".to_owned(),
            remote_root.to_owned(),
            local.display().to_string(),
        ];
        if let Err(e) = self.invoker.invoke(CEPH_FUSE, &args) {
            error!("cephfs mount failed: {e}");
            return Err(e);
        }

        self.mounted.store(true, Ordering::SeqCst);
        Ok(local.clone())
    }

    fn create_share(&self, name: &str) -> Result<PathBuf, BackendError> {
        let path = self.share_path(name)?;
        if let Err(e) = fs::create_dir_all(&path) {
            error!("failed to create share {}: {e}", path.display());
            return Err(BackendError::ShareCreate(path.display().to_string()));
        }
        info!("created share {}", path.display());
        Ok(path)
    }

    fn delete_share(&self, name: &str) -> Result<(), BackendError> {
        let path = self.share_path(name)?;
        if let Err(e) = fs::remove_dir_all(&path) {
            error!("failed to delete share {}: {e}", path.display());
            return Err(BackendError::ShareDelete(path.display().to_string()));
        }
        info!("deleted share {}", path.display());
        Ok(())
    }

    fn paths_for_share(&self, name: &str) -> Result<SharePaths, BackendError> {
        let path = self.share_path(name)?;
        if !path.exists() {
            error!("share not found: {}", path.display());
            return Err(BackendError::ShareNotFound);
        }

        let remote = Path::new(&self.config.remote_mount_path).join(name);
        let local = Path::new(CELL_BASE_PATH).join(name);
        Ok(SharePaths {
            remote: remote.display().to_string(),
            local: local.display().to_string(),
        })
    }

    fn config_details(&self) -> Result<ConnectionDetails, BackendError> {
        if self.config.mds.is_empty() {
            return Err(BackendError::MissingConfig("mds address is not set"));
        }
        if self.config.keyring_file.as_os_str().is_empty() {
            return Err(BackendError::MissingConfig("keyring file is not set"));
        }
        let keyring = fs::read_to_string(&self.config.keyring_file).map_err(|e| {
            error!(
                "failed to read keyring {}: {e}",
                self.config.keyring_file.display()
            );
            BackendError::KeyringNotFound
        })?;
        Ok(ConnectionDetails {
            mds: self.config.mds.clone(),
            keyring,
        })
    }
}
