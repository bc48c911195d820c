pub mod azure;
pub mod cleanup;
pub mod config;
pub mod disk;
pub mod network;
pub mod types;
pub mod vm_manager;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use cleanup::CleanupStep;
use config::AzureProperties;
use types::{DiskKind, DiskRef, InstanceId, VmHandle, VmParams};
use vm_manager::VmManager;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("azure api error: {0}")]
    Azure(#[from] azure_api::Error),

    /// Provisioning was accepted but its async operation ended in `status`.
    #[error("VM provisioning finished with status {status}: {message}")]
    Provisioning { status: String, message: String },

    #[error("{0}")]
    Cloud(String),

    #[error(
        "VM {vm_name} failed in provisioning and cleanup before retry could not complete \
         ({step} failed: {cleanup})\nprovisioning error: {cause}\n{kept}"
    )]
    CleanupAborted {
        vm_name: String,
        cause: Box<Error>,
        step: CleanupStep,
        cleanup: Box<Error>,
        kept: KeptResources,
    },

    #[error("VM {vm_name} failed in provisioning after {attempts} attempts: {cause}{}", kept_note(.kept))]
    RetriesExhausted {
        vm_name: String,
        attempts: u32,
        cause: Box<Error>,
        kept: Option<KeptResources>,
    },

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn kept_note(kept: &Option<KeptResources>) -> String {
    kept.as_ref().map(|k| format!("\n{k}")).unwrap_or_default()
}

/// Why the resources of a failed VM were left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeptReason {
    CleanupFailed,
    RetriesExhausted,
}

/// Resources of a failed VM left in place for investigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeptResources {
    pub reason: KeptReason,
    pub vm_name: String,
    pub os_disk: String,
    pub ephemeral_disk: Option<String>,
    pub nics: Vec<String>,
}

impl fmt::Display for KeptResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            KeptReason::CleanupFailed => "because cleanup could not complete",
            KeptReason::RetriesExhausted => "after exhausting provisioning retries",
        };
        write!(
            f,
            "The resources of VM {} are kept {reason}. Delete them manually after finishing \
             the investigation: virtual machine {}, OS disk {}",
            self.vm_name, self.vm_name, self.os_disk
        )?;
        if let Some(disk) = &self.ephemeral_disk {
            write!(f, ", ephemeral disk {disk}")?;
        }
        if !self.nics.is_empty() {
            write!(f, ", network interfaces {}", self.nics.join(", "))?;
        }
        Ok(())
    }
}

/// Cloud compute operations the create path drives.
///
/// `create_virtual_machine` returns [`Error::Provisioning`] when the VM was
/// accepted but its asynchronous provisioning ended in a non-success status.
/// Every other error is treated as generic.
#[async_trait]
pub trait ComputeClient: Send + Sync + 'static {
    /// Create a VM and wait until provisioning reaches a terminal state.
    async fn create_virtual_machine(&self, params: &VmParams) -> Result<VmHandle>;

    async fn delete_virtual_machine(&self, vm_name: &str) -> Result<()>;

    async fn delete_network_interface(&self, nic_name: &str) -> Result<()>;
}

/// Disk deletion for one disk provisioning mode.
///
/// `key` is the routing key of the mode: the storage account name for
/// unmanaged disks, the resource group name for managed disks.
#[async_trait]
pub trait DiskManager: Send + Sync + 'static {
    fn kind(&self) -> DiskKind;

    async fn delete_disk(&self, key: &str, disk_name: &str) -> Result<()>;

    /// The ephemeral disk created for `instance_id`, if it exists.
    async fn ephemeral_disk(&self, instance_id: &InstanceId) -> Result<Option<DiskRef>>;

    /// Whether VMs in this mode leave status blobs that need cleanup.
    fn has_status_files(&self) -> bool;

    /// Delete the status blobs of `vm_name`. Only called when
    /// [`DiskManager::has_status_files`] is true.
    async fn delete_vm_status_files(&self, key: &str, vm_name: &str) -> Result<()>;
}

/// Wire the Azure clients together and pick the disk manager variant.
///
/// The variant and its routing key are fixed here for the lifetime of the
/// returned manager.
pub fn build_vm_manager(props: &AzureProperties) -> Result<VmManager> {
    let mut client = azure_api::AzureClient::new(
        props.access_token.clone(),
        props.subscription_id.clone(),
        props.resource_group_name.clone(),
    )
    .with_poll_interval(props.poll_interval)
    .with_operation_timeout(props.operation_timeout);
    if let Some(endpoint) = &props.resource_manager_endpoint {
        client = client.with_base_url(endpoint.clone());
    }

    let compute = Arc::new(azure::AzureCompute::new(
        client.clone(),
        props.ssh_user.clone(),
        props.ssh_public_key.clone(),
    ));

    let (disks, disk_key): (Arc<dyn DiskManager>, String) = if props.use_managed_disks {
        tracing::info!(resource_group = %props.resource_group_name, "using managed disks");
        (
            Arc::new(disk::ManagedDiskManager::new(client)),
            props.resource_group_name.clone(),
        )
    } else {
        let account = props
            .storage_account_name
            .clone()
            .ok_or_else(|| Error::MissingEnv("AZURE_STORAGE_ACCOUNT_NAME".into()))?;
        let access_key = props
            .storage_access_key
            .as_deref()
            .ok_or_else(|| Error::MissingEnv("AZURE_STORAGE_ACCESS_KEY".into()))?;
        let storage = azure_api::StorageClient::new(account.clone(), access_key)?;

        tracing::info!(storage_account = %account, "using unmanaged disks");
        (Arc::new(disk::UnmanagedDiskManager::new(storage)), account)
    };

    VmManager::new(props.settings(), compute, disks, disk_key)
}
