use crate::model::{MountConfig, SharedDevice};
use crate::BrokerError;
use cephbroker_backend::BackendClient;
use std::sync::Arc;
use tracing::{error, info};

/// Part of the filesystem mounted on the broker host; shares live below it.
pub const REMOTE_ROOT: &str = "/";

/// Backend side effects of the lifecycle operations.
///
/// Failures are reported as [`BrokerError::Backend`] carrying only the
/// backend's message.
pub trait Controller: Send + Sync {
    /// Make sure the filesystem is mounted, then create the share `name`.
    fn create(&self, name: &str) -> Result<(), BrokerError>;

    fn remove(&self, name: &str) -> Result<(), BrokerError>;

    /// Describe how a consumer attaches the share of `instance_id`.
    fn bind(&self, instance_id: &str) -> Result<SharedDevice, BrokerError>;
}

pub struct CephController {
    client: Arc<dyn BackendClient>,
}

impl CephController {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self { client }
    }
}

impl Controller for CephController {
    fn create(&self, name: &str) -> Result<(), BrokerError> {
        if !self.client.is_mounted() {
            self.client.mount(REMOTE_ROOT)?;
        }
        let share = self.client.create_share(name)?;
        info!("share for {name} created at {}", share.display());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), BrokerError> {
        self.client.delete_share(name).map_err(|e| {
            error!("error deleting share {name}: {e}");
            BrokerError::from(e)
        })
    }

    fn bind(&self, instance_id: &str) -> Result<SharedDevice, BrokerError> {
        let paths = self.client.paths_for_share(instance_id).map_err(|e| {
            error!("failed getting paths for share {instance_id}: {e}");
            BrokerError::from(e)
        })?;
        let details = self.client.config_details().map_err(|e| {
            error!("failed to read connection details: {e}");
            BrokerError::from(e)
        })?;

        let host = details.mds.split(':').next().unwrap_or_default().to_owned();

        Ok(SharedDevice {
            volume_id: instance_id.to_owned(),
            mount_config: MountConfig {
                ip: host,
                keyring: details.keyring,
                remote_mount_point: paths.remote,
                local_mount_point: paths.local,
            },
        })
    }
}
