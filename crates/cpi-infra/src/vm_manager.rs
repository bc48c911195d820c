//! VM creation with failure cleanup and bounded retry.
//!
//! A create call makes up to [`MAX_CREATE_ATTEMPTS`] attempts. Each failure is
//! classified once, at the call site:
//!
//! - **Generic** failures (and async failures with a status other than
//!   `Failed`) get one cleanup pass that also removes the NICs, then the
//!   original error is returned. If a cleanup step fails, that step's error is
//!   returned instead and no later step runs.
//! - **`Failed` provisioning status** triggers a per-attempt cleanup (VM with
//!   up to [`MAX_VM_DELETE_TRIES`](crate::cleanup::MAX_VM_DELETE_TRIES) delete
//!   tries, OS disk, ephemeral disk, status files) and another attempt. If
//!   that cleanup fails the whole protocol stops and the remaining resources
//!   are kept. After the last attempt the NICs are deleted once, unless
//!   `keep_failed_vms` is set, in which case the last VM, its disks and the
//!   NICs are all left in place.
//!
//! All state lives in the `create` call; a `VmManager` can serve concurrent
//! creates for different instances.

use std::sync::Arc;

use azure_api::PROVISIONING_STATE_FAILED;
use tracing::{debug, error, info, warn};

use crate::cleanup::{CleanupFailure, CleanupPlan, CleanupScope, CleanupStep};
use crate::config::Settings;
use crate::disk::{ephemeral_disk_name, os_disk_name};
use crate::network::NetworkConfigurator;
use crate::types::{
    DiskKind, EphemeralDiskParams, Environment, InstanceId, ResourcePool, StemcellInfo, VmHandle,
    VmParams,
};
use crate::{ComputeClient, DiskManager, Error, KeptReason, KeptResources, Result};

/// Create attempts per `create` call.
pub const MAX_CREATE_ATTEMPTS: u32 = 3;

/// How a failed create attempt is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Any failure without a provisioning status.
    Generic,
    /// Provisioning ended in a status other than `Failed`.
    AsyncNotFailed(String),
    /// Provisioning ended in `Failed`; the attempt may be retried.
    AsyncFailed(String),
}

impl FailureClass {
    pub fn of(err: &Error) -> Self {
        let status = match err {
            Error::Provisioning { status, .. } => status,
            Error::Azure(azure_api::Error::AsyncOperation { status, .. }) => status,
            _ => return Self::Generic,
        };

        if status == PROVISIONING_STATE_FAILED {
            Self::AsyncFailed(status.clone())
        } else {
            Self::AsyncNotFailed(status.clone())
        }
    }
}

/// Bookkeeping for one `create` call.
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    errors: Vec<Error>,
    resources_kept: bool,
}

pub struct VmManager {
    settings: Settings,
    disk_key: String,
    compute: Arc<dyn ComputeClient>,
    disks: Arc<dyn DiskManager>,
}

impl VmManager {
    /// `disks` must match `settings.use_managed_disks`; `disk_key` is its
    /// routing key (storage account or resource group).
    pub fn new(
        settings: Settings,
        compute: Arc<dyn ComputeClient>,
        disks: Arc<dyn DiskManager>,
        disk_key: impl Into<String>,
    ) -> Result<Self> {
        let expected = if settings.use_managed_disks {
            DiskKind::Managed
        } else {
            DiskKind::Unmanaged
        };
        if disks.kind() != expected {
            return Err(Error::InvalidConfig(format!(
                "{} disk manager configured but {expected} disks requested",
                disks.kind()
            )));
        }

        Ok(Self {
            settings,
            disk_key: disk_key.into(),
            compute,
            disks,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Create a VM, cleaning up and retrying according to the failure class.
    pub async fn create(
        &self,
        instance_id: &InstanceId,
        location: &str,
        stemcell: &StemcellInfo,
        resource_pool: &ResourcePool,
        network: &NetworkConfigurator,
        env: &Environment,
    ) -> Result<VmHandle> {
        let params = self.vm_params(instance_id, location, stemcell, resource_pool, network, env);
        let mut state = RetryState::default();

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            state.attempts = attempt;
            info!(vm_name = %params.vm_name, attempt, "creating virtual machine");

            let err = match self.compute.create_virtual_machine(&params).await {
                Ok(handle) => {
                    info!(vm_name = %params.vm_name, attempt, "virtual machine created");
                    return Ok(handle);
                }
                Err(e) => e,
            };

            match FailureClass::of(&err) {
                FailureClass::Generic | FailureClass::AsyncNotFailed(_) => {
                    warn!(vm_name = %params.vm_name, attempt, error = %err, "virtual machine is not created, cleaning up");
                    return match self.cleanup(&params, CleanupScope::SinglePass).await {
                        Ok(()) => Err(err),
                        Err(failure) => {
                            error!(
                                vm_name = %params.vm_name,
                                step = %failure.step,
                                error = %failure.error,
                                create_error = %err,
                                "cleanup after failed create did not complete"
                            );
                            Err(failure.error)
                        }
                    };
                }
                FailureClass::AsyncFailed(status) => {
                    warn!(vm_name = %params.vm_name, attempt, %status, "virtual machine failed in provisioning");

                    if attempt == MAX_CREATE_ATTEMPTS && self.settings.keep_failed_vms {
                        info!(vm_name = %params.vm_name, "keeping the resources of the last failed attempt");
                        state.resources_kept = true;
                    } else if let Err(failure) =
                        self.cleanup(&params, CleanupScope::PerAttempt).await
                    {
                        error!(
                            vm_name = %params.vm_name,
                            attempt,
                            step = %failure.step,
                            error = %failure.error,
                            "cleanup before retry failed, keeping VM resources"
                        );
                        return Err(Error::CleanupAborted {
                            vm_name: params.vm_name.clone(),
                            cause: Box::new(err),
                            step: failure.step,
                            cleanup: Box::new(failure.error),
                            kept: self.kept(&params, KeptReason::CleanupFailed),
                        });
                    }

                    state.errors.push(err);
                }
            }
        }

        self.retries_exhausted(&params, state).await
    }

    fn vm_params(
        &self,
        instance_id: &InstanceId,
        location: &str,
        stemcell: &StemcellInfo,
        resource_pool: &ResourcePool,
        network: &NetworkConfigurator,
        env: &Environment,
    ) -> VmParams {
        let vm_name = instance_id.vm_name().to_string();
        let ephemeral_disk = (!resource_pool.ephemeral_disk.use_root_disk).then(|| {
            EphemeralDiskParams {
                name: ephemeral_disk_name(instance_id),
                size_gb: resource_pool.ephemeral_disk.size_gb,
            }
        });

        VmParams {
            instance_id: instance_id.clone(),
            location: location.to_string(),
            vm_size: resource_pool.instance_type.clone(),
            stemcell: stemcell.clone(),
            os_disk_name: os_disk_name(instance_id),
            root_disk_size_gb: resource_pool.root_disk_size_gb,
            ephemeral_disk,
            storage_account_type: resource_pool.storage_account_type.clone(),
            disk_key: self.disk_key.clone(),
            use_managed_disks: self.settings.use_managed_disks,
            nic_names: network.nic_names(&vm_name),
            env: env.clone(),
            vm_name,
        }
    }

    /// Terminal handling once every attempt ended in `Failed`.
    async fn retries_exhausted(&self, params: &VmParams, mut state: RetryState) -> Result<VmHandle> {
        let Some(cause) = state.errors.pop() else {
            return Err(Error::Cloud(format!(
                "no failed attempt recorded for VM {}",
                params.vm_name
            )));
        };
        debug!(
            vm_name = %params.vm_name,
            earlier_failures = state.errors.len(),
            "all create attempts failed in provisioning"
        );

        let kept = if state.resources_kept {
            warn!(vm_name = %params.vm_name, "VM failed after retries, resources are kept");
            Some(self.kept(params, KeptReason::RetriesExhausted))
        } else {
            if let Err(e) = self.delete_nics(&params.nic_names).await {
                error!(vm_name = %params.vm_name, error = %e, "deleting network interfaces failed");
                return Err(e);
            }
            None
        };

        Err(Error::RetriesExhausted {
            vm_name: params.vm_name.clone(),
            attempts: state.attempts,
            cause: Box::new(cause),
            kept,
        })
    }

    fn kept(&self, params: &VmParams, reason: KeptReason) -> KeptResources {
        KeptResources {
            reason,
            vm_name: params.vm_name.clone(),
            os_disk: params.os_disk_name.clone(),
            ephemeral_disk: params.ephemeral_disk.as_ref().map(|d| d.name.clone()),
            nics: params.nic_names.clone(),
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────

    async fn cleanup(&self, params: &VmParams, scope: CleanupScope) -> std::result::Result<(), CleanupFailure> {
        let plan = CleanupPlan::new(scope, self.disks.has_status_files());

        for &step in plan.steps() {
            debug!(vm_name = %params.vm_name, %step, "cleanup step");
            self.run_step(step, params, scope)
                .await
                .map_err(|error| CleanupFailure { step, error })?;
        }
        Ok(())
    }

    async fn run_step(&self, step: CleanupStep, params: &VmParams, scope: CleanupScope) -> Result<()> {
        match step {
            CleanupStep::DeleteVm => {
                self.delete_vm(&params.vm_name, scope.vm_delete_tries())
                    .await
            }
            CleanupStep::DeleteOsDisk => {
                self.disks
                    .delete_disk(&self.disk_key, &params.os_disk_name)
                    .await
            }
            CleanupStep::DeleteEphemeralDisk => {
                match self.disks.ephemeral_disk(&params.instance_id).await? {
                    Some(disk) => self.disks.delete_disk(&self.disk_key, &disk.name).await,
                    None => {
                        debug!(vm_name = %params.vm_name, "no ephemeral disk to delete");
                        Ok(())
                    }
                }
            }
            CleanupStep::DeleteStatusFiles => {
                self.disks
                    .delete_vm_status_files(&self.disk_key, &params.vm_name)
                    .await
            }
            CleanupStep::DeleteNics => self.delete_nics(&params.nic_names).await,
        }
    }

    async fn delete_vm(&self, vm_name: &str, max_tries: u32) -> Result<()> {
        let mut tries = 1;
        loop {
            match self.compute.delete_virtual_machine(vm_name).await {
                Ok(()) => return Ok(()),
                Err(e) if tries < max_tries => {
                    warn!(vm_name, tries, max_tries, error = %e, "deleting virtual machine failed, retrying");
                    tries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete NICs in order, stopping at the first failure.
    async fn delete_nics(&self, nic_names: &[String]) -> Result<()> {
        for nic in nic_names {
            self.compute.delete_network_interface(nic).await?;
        }
        Ok(())
    }
}
