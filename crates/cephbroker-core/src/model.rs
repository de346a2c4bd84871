//! Request and response types of the broker API.
//!
//! Requests carry a free-form `parameters` bag as sent by the platform. Bind
//! parameters are turned into a typed [`BindOptions`] before use, and both
//! request types expose `same_request` for conflict detection on re-requests.

use crate::BrokerError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub type Parameters = BTreeMap<String, Value>;

/// Base directory for container mounts when the binding names none.
pub const DEFAULT_CONTAINER_PATH: &str = "/var/vcap/data";

/// Volume driver consumers use to attach a share.
pub const DRIVER_NAME: &str = "cephdriver";

const PARAM_MOUNT: &str = "mount";
const PARAM_READONLY: &str = "readonly";

/// `"parameters": null` is accepted and read as an empty map.
fn nullable_parameters<'de, D>(deserializer: D) -> Result<Parameters, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Parameters>::deserialize(deserializer)?.unwrap_or_default())
}

fn without_nulls(parameters: &Parameters) -> Parameters {
    parameters
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionDetails {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    #[serde(
        default,
        deserialize_with = "nullable_parameters",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub parameters: Parameters,
}

impl ProvisionDetails {
    /// Copy with defaults applied: null parameters are the same as absent ones.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            parameters: without_nulls(&self.parameters),
            ..self.clone()
        }
    }

    /// Whether `other` asks for exactly the same instance as `self`.
    pub fn same_request(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.service_id == b.service_id
            && a.plan_id == b.plan_id
            && a.organization_guid == b.organization_guid
            && a.space_guid == b.space_guid
            && a.parameters == b.parameters
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindDetails {
    #[serde(default)]
    pub app_guid: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(
        default,
        deserialize_with = "nullable_parameters",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub parameters: Parameters,
}

impl BindDetails {
    /// Copy with defaults applied: null parameters, `readonly: false` and an
    /// empty `mount` all mean the same as leaving the parameter out.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut parameters = without_nulls(&self.parameters);
        if parameters.get(PARAM_READONLY) == Some(&Value::Bool(false)) {
            parameters.remove(PARAM_READONLY);
        }
        if parameters.get(PARAM_MOUNT) == Some(&Value::String(String::new())) {
            parameters.remove(PARAM_MOUNT);
        }
        Self {
            parameters,
            ..self.clone()
        }
    }

    pub fn same_request(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.app_guid == b.app_guid
            && a.plan_id == b.plan_id
            && a.service_id == b.service_id
            && a.parameters == b.parameters
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum MountMode {
    #[serde(rename = "r")]
    ReadOnly,
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
}

/// Validated bind parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindOptions {
    pub mount: Option<String>,
    pub mode: MountMode,
}

impl BindOptions {
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, BrokerError> {
        let mode = match parameters.get(PARAM_READONLY) {
            None | Some(Value::Bool(false)) => MountMode::ReadWrite,
            Some(Value::Bool(true)) => MountMode::ReadOnly,
            Some(other) => {
                return Err(BrokerError::InvalidParameters(format!(
                    "'{PARAM_READONLY}' must be a boolean, got {other}"
                )));
            }
        };

        let mount = match parameters.get(PARAM_MOUNT) {
            None => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(BrokerError::InvalidParameters(format!(
                    "'{PARAM_MOUNT}' must be a string, got {other}"
                )));
            }
        };

        Ok(Self { mount, mode })
    }

    /// Path the share appears at inside the consumer's container.
    pub fn container_dir(&self, instance_id: &str) -> String {
        match &self.mount {
            Some(mount) => mount.clone(),
            None => Path::new(DEFAULT_CONTAINER_PATH)
                .join(instance_id)
                .display()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountConfig {
    pub ip: String,
    pub keyring: String,
    pub remote_mount_point: String,
    pub local_mount_point: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedDevice {
    pub volume_id: String,
    pub mount_config: MountConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMount {
    pub driver: String,
    pub container_dir: String,
    pub mode: MountMode,
    pub device_type: String,
    pub device: SharedDevice,
}

/// Always serialized as `{}`; consumers reject a binding without it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    #[serde(default)]
    pub credentials: Credentials,
    pub volume_mounts: Vec<VolumeMount>,
}

impl Binding {
    pub fn shared_volume(device: SharedDevice, options: &BindOptions) -> Self {
        let container_dir = options.container_dir(&device.volume_id);
        Self {
            credentials: Credentials {},
            volume_mounts: vec![VolumeMount {
                driver: DRIVER_NAME.to_owned(),
                container_dir,
                mode: options.mode,
                device_type: "shared".to_owned(),
                device,
            }],
        }
    }
}
