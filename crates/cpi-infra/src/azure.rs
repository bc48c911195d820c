use std::collections::HashMap;

use async_trait::async_trait;
use azure_api::{
    AzureClient, DataDisk, HardwareProfile, ImageReference, LinuxConfiguration,
    ManagedDiskParameters, NetworkInterfaceReference, NetworkInterfaceReferenceProperties,
    NetworkProfile, OsDisk, OsProfile, SshConfiguration, SshPublicKey, StorageProfile,
    VirtualHardDisk, VirtualMachine, VirtualMachineProperties,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::disk::vhd_uri;
use crate::types::{Environment, VmHandle, VmParams};
use crate::{ComputeClient, Error, Result};

const CACHING: &str = "ReadWrite";
const EPHEMERAL_DISK_LUN: u32 = 0;

/// Azure Resource Manager compute client.
///
/// Delegates to `azure_api::AzureClient` for all HTTP calls.
pub struct AzureCompute {
    client: AzureClient,
    ssh_user: String,
    ssh_public_key: Option<String>,
}

impl AzureCompute {
    pub fn new(client: AzureClient, ssh_user: String, ssh_public_key: Option<String>) -> Self {
        Self {
            client,
            ssh_user,
            ssh_public_key,
        }
    }

    /// Agent environment as base64 JSON, the format Azure expects for `customData`.
    fn custom_data(env: &Environment) -> Result<String> {
        let json = serde_json::to_vec(env)
            .map_err(|e| Error::Cloud(format!("encode custom data: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    fn storage_profile(params: &VmParams) -> Result<StorageProfile> {
        let managed = || {
            Some(ManagedDiskParameters {
                storage_account_type: params.storage_account_type.clone(),
            })
        };

        let data_disks = params
            .ephemeral_disk
            .iter()
            .map(|disk| DataDisk {
                name: disk.name.clone(),
                lun: EPHEMERAL_DISK_LUN,
                create_option: "Empty".into(),
                caching: CACHING.into(),
                disk_size_gb: disk.size_gb,
                vhd: (!params.use_managed_disks).then(|| VirtualHardDisk {
                    uri: vhd_uri(&params.disk_key, &disk.name),
                }),
                managed_disk: if params.use_managed_disks { managed() } else { None },
            })
            .collect();

        let mut os_disk = OsDisk {
            name: params.os_disk_name.clone(),
            os_type: params.stemcell.os_type.clone(),
            create_option: "FromImage".into(),
            caching: CACHING.into(),
            image: None,
            vhd: None,
            managed_disk: None,
            disk_size_gb: params.root_disk_size_gb,
        };

        let image_reference = if params.use_managed_disks {
            let image_id = params.stemcell.image_id.clone().ok_or_else(|| {
                Error::InvalidConfig("stemcell has no image id for managed disks".into())
            })?;
            os_disk.managed_disk = managed();
            Some(ImageReference { id: image_id })
        } else {
            let image_uri = params.stemcell.image_uri.clone().ok_or_else(|| {
                Error::InvalidConfig("stemcell has no image uri for unmanaged disks".into())
            })?;
            os_disk.image = Some(VirtualHardDisk { uri: image_uri });
            os_disk.vhd = Some(VirtualHardDisk {
                uri: vhd_uri(&params.disk_key, &params.os_disk_name),
            });
            None
        };

        Ok(StorageProfile {
            image_reference,
            os_disk,
            data_disks,
        })
    }

    fn virtual_machine(&self, params: &VmParams) -> Result<VirtualMachine> {
        let network_interfaces = params
            .nic_names
            .iter()
            .enumerate()
            .map(|(index, nic)| NetworkInterfaceReference {
                id: self
                    .client
                    .resource_id("Microsoft.Network", "networkInterfaces", nic),
                properties: NetworkInterfaceReferenceProperties { primary: index == 0 },
            })
            .collect();

        let ssh = self.ssh_public_key.as_ref().map(|key| SshConfiguration {
            public_keys: vec![SshPublicKey {
                path: format!("/home/{}/.ssh/authorized_keys", self.ssh_user),
                key_data: key.clone(),
            }],
        });

        let mut tags = HashMap::new();
        tags.insert("user-agent".to_string(), "azure-cpi".to_string());

        Ok(VirtualMachine {
            id: None,
            name: Some(params.vm_name.clone()),
            location: params.location.clone(),
            tags,
            properties: VirtualMachineProperties {
                hardware_profile: HardwareProfile {
                    vm_size: params.vm_size.clone(),
                },
                os_profile: Some(OsProfile {
                    computer_name: params.vm_name.clone(),
                    admin_username: self.ssh_user.clone(),
                    custom_data: Some(Self::custom_data(&params.env)?),
                    linux_configuration: Some(LinuxConfiguration {
                        disable_password_authentication: true,
                        ssh,
                    }),
                }),
                storage_profile: Self::storage_profile(params)?,
                network_profile: NetworkProfile { network_interfaces },
                provisioning_state: None,
            },
        })
    }
}

#[async_trait]
impl ComputeClient for AzureCompute {
    async fn create_virtual_machine(&self, params: &VmParams) -> Result<VmHandle> {
        let request = self.virtual_machine(params)?;

        let vm = match self.client.create_virtual_machine(&params.vm_name, &request).await {
            Ok(vm) => vm,
            Err(azure_api::Error::AsyncOperation { status, body, .. }) => {
                return Err(Error::Provisioning {
                    status,
                    message: body,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            vm_name = %params.vm_name,
            state = ?vm.properties.provisioning_state,
            "azure: virtual machine created"
        );

        Ok(VmHandle {
            vm_name: params.vm_name.clone(),
            id: vm.id,
            location: vm.location,
            provisioning_state: vm.properties.provisioning_state,
        })
    }

    async fn delete_virtual_machine(&self, vm_name: &str) -> Result<()> {
        self.client.delete_virtual_machine(vm_name).await?;
        info!(vm_name, "azure: virtual machine deleted");
        Ok(())
    }

    async fn delete_network_interface(&self, nic_name: &str) -> Result<()> {
        self.client.delete_network_interface(nic_name).await?;
        info!(nic_name, "azure: network interface deleted");
        Ok(())
    }
}
