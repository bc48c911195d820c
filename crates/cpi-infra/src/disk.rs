use async_trait::async_trait;
use azure_api::{AzureClient, StorageClient};
use tracing::{debug, info};

use crate::types::{DiskKind, DiskRef, InstanceId};
use crate::{DiskManager, Error, Result};

/// Blob container holding unmanaged VHDs and VM status blobs.
pub const DISK_CONTAINER: &str = "bosh";

const OS_DISK_PREFIX: &str = "bosh-os";
const EPHEMERAL_DISK_POSTFIX: &str = "ephemeral-disk";
const STATUS_FILE_SUFFIX: &str = "status";

pub fn os_disk_name(instance_id: &InstanceId) -> String {
    format!("{OS_DISK_PREFIX}-{instance_id}")
}

pub fn ephemeral_disk_name(instance_id: &InstanceId) -> String {
    format!("{OS_DISK_PREFIX}-{instance_id}-{EPHEMERAL_DISK_POSTFIX}")
}

/// URI of the page blob backing an unmanaged disk.
pub fn vhd_uri(storage_account: &str, disk_name: &str) -> String {
    format!("https://{storage_account}.blob.core.windows.net/{DISK_CONTAINER}/{disk_name}.vhd")
}

/// Disks stored as VHD page blobs in a storage account.
pub struct UnmanagedDiskManager {
    storage: StorageClient,
}

impl UnmanagedDiskManager {
    pub fn new(storage: StorageClient) -> Self {
        Self { storage }
    }

    fn storage(&self, account: &str) -> Result<&StorageClient> {
        if account != self.storage.account() {
            return Err(Error::InvalidConfig(format!(
                "no credentials for storage account {account}"
            )));
        }
        Ok(&self.storage)
    }
}

#[async_trait]
impl DiskManager for UnmanagedDiskManager {
    fn kind(&self) -> DiskKind {
        DiskKind::Unmanaged
    }

    async fn delete_disk(&self, key: &str, disk_name: &str) -> Result<()> {
        self.storage(key)?
            .delete_blob(DISK_CONTAINER, &format!("{disk_name}.vhd"))
            .await?;
        info!(storage_account = key, disk_name, "unmanaged disk deleted");
        Ok(())
    }

    async fn ephemeral_disk(&self, instance_id: &InstanceId) -> Result<Option<DiskRef>> {
        let name = ephemeral_disk_name(instance_id);
        let exists = self
            .storage
            .blob_exists(DISK_CONTAINER, &format!("{name}.vhd"))
            .await?;

        Ok(exists.then_some(DiskRef { name }))
    }

    fn has_status_files(&self) -> bool {
        true
    }

    /// Delete the boot status blobs Azure writes next to the VHDs.
    async fn delete_vm_status_files(&self, key: &str, vm_name: &str) -> Result<()> {
        let storage = self.storage(key)?;
        let blobs = storage.list_blobs(DISK_CONTAINER, vm_name).await?;

        for blob in blobs.iter().filter(|b| b.ends_with(STATUS_FILE_SUFFIX)) {
            debug!(storage_account = key, blob = %blob, "deleting VM status file");
            storage.delete_blob(DISK_CONTAINER, blob).await?;
        }
        Ok(())
    }
}

/// Managed disk resources in the CPI's resource group.
pub struct ManagedDiskManager {
    client: AzureClient,
}

impl ManagedDiskManager {
    pub fn new(client: AzureClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiskManager for ManagedDiskManager {
    fn kind(&self) -> DiskKind {
        DiskKind::Managed
    }

    async fn delete_disk(&self, key: &str, disk_name: &str) -> Result<()> {
        if key != self.client.resource_group() {
            return Err(Error::InvalidConfig(format!(
                "managed disks live in resource group {}, not {key}",
                self.client.resource_group()
            )));
        }
        self.client.delete_managed_disk(disk_name).await?;
        info!(resource_group = key, disk_name, "managed disk deleted");
        Ok(())
    }

    async fn ephemeral_disk(&self, instance_id: &InstanceId) -> Result<Option<DiskRef>> {
        let disk = self
            .client
            .get_managed_disk(&ephemeral_disk_name(instance_id))
            .await?;

        Ok(disk.map(|d| DiskRef { name: d.name }))
    }

    fn has_status_files(&self) -> bool {
        false
    }

    async fn delete_vm_status_files(&self, _key: &str, vm_name: &str) -> Result<()> {
        Err(Error::InvalidConfig(format!(
            "managed disks keep no status files (VM {vm_name})"
        )))
    }
}
