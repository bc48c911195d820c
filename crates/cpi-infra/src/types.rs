use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// CPI-side VM identifier. Doubles as the Azure VM name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn vm_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the OS image for a new VM comes from.
///
/// Unmanaged-disk VMs copy a VHD blob (`image_uri`); managed-disk VMs are
/// created from an image resource (`image_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemcellInfo {
    #[serde(default = "default_os_type")]
    pub os_type: String,
    #[serde(default)]
    pub image_uri: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
}

fn default_os_type() -> String {
    "Linux".into()
}

/// Sizing of the VM being created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub instance_type: String,
    #[serde(default)]
    pub root_disk_size_gb: Option<u32>,
    #[serde(default)]
    pub ephemeral_disk: EphemeralDiskSpec,
    #[serde(default = "default_storage_account_type")]
    pub storage_account_type: String,
}

fn default_storage_account_type() -> String {
    "Standard_LRS".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralDiskSpec {
    /// Put ephemeral data on the OS disk instead of a separate data disk.
    #[serde(default)]
    pub use_root_disk: bool,
    #[serde(default = "default_ephemeral_size_gb")]
    pub size_gb: u32,
}

fn default_ephemeral_size_gb() -> u32 {
    30
}

impl Default for EphemeralDiskSpec {
    fn default() -> Self {
        Self {
            use_root_disk: false,
            size_gb: default_ephemeral_size_gb(),
        }
    }
}

/// Agent environment passed through to the VM.
pub type Environment = HashMap<String, serde_json::Value>;

/// Ephemeral data disk to attach at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralDiskParams {
    pub name: String,
    pub size_gb: u32,
}

/// Everything a single create attempt needs.
///
/// Built once per `create` call and reused unchanged by every attempt.
#[derive(Debug, Clone)]
pub struct VmParams {
    pub instance_id: InstanceId,
    pub vm_name: String,
    pub location: String,
    pub vm_size: String,
    pub stemcell: StemcellInfo,
    pub os_disk_name: String,
    pub root_disk_size_gb: Option<u32>,
    pub ephemeral_disk: Option<EphemeralDiskParams>,
    pub storage_account_type: String,
    /// Storage account (unmanaged) or resource group (managed) holding the disks.
    pub disk_key: String,
    pub use_managed_disks: bool,
    pub nic_names: Vec<String>,
    pub env: Environment,
}

/// A VM that finished provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmHandle {
    pub vm_name: String,
    pub id: Option<String>,
    pub location: String,
    pub provisioning_state: Option<String>,
}

/// An existing disk as reported by a disk manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRef {
    pub name: String,
}

/// Disk provisioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskKind {
    Managed,
    Unmanaged,
}

impl fmt::Display for DiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => f.write_str("managed"),
            Self::Unmanaged => f.write_str("unmanaged"),
        }
    }
}
