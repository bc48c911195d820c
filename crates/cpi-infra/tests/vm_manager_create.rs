//! Create-path failure handling of `VmManager`.
//!
//! Uses recording doubles for the compute client and disk managers so each
//! scenario can assert exact call counts.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rstest::rstest;

use cpi_infra::cleanup::CleanupStep;
use cpi_infra::config::Settings;
use cpi_infra::network::{NetworkConfigurator, NetworkSpec};
use cpi_infra::types::{
    DiskKind, DiskRef, EphemeralDiskSpec, Environment, InstanceId, ResourcePool, StemcellInfo,
    VmHandle, VmParams,
};
use cpi_infra::vm_manager::VmManager;
use cpi_infra::{ComputeClient, DiskManager, Error, KeptReason, Result};

const STORAGE_ACCOUNT: &str = "boshstore";
const RESOURCE_GROUP: &str = "bosh-rg";
const VM_NAME: &str = "e5f7c7b1-4c4e-4b8a-9d35-7cf1d0b2a911";
const OS_DISK: &str = "bosh-os-e5f7c7b1-4c4e-4b8a-9d35-7cf1d0b2a911";
const EPHEMERAL_DISK: &str = "bosh-os-e5f7c7b1-4c4e-4b8a-9d35-7cf1d0b2a911-ephemeral-disk";

// ── Doubles ──────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum CreateOutcome {
    Succeed,
    Generic,
    Status(&'static str),
}

#[derive(Clone, Copy, PartialEq)]
enum VmDelete {
    Succeed,
    AlwaysFail,
    FailFirstCall,
}

struct MockCompute {
    outcome: CreateOutcome,
    vm_delete: VmDelete,
    fail_nic_delete: bool,
    creates: Mutex<Vec<String>>,
    vm_deletes: AtomicUsize,
    nic_deletes: Mutex<Vec<String>>,
}

impl MockCompute {
    fn new(outcome: CreateOutcome) -> Self {
        Self {
            outcome,
            vm_delete: VmDelete::Succeed,
            fail_nic_delete: false,
            creates: Mutex::new(Vec::new()),
            vm_deletes: AtomicUsize::new(0),
            nic_deletes: Mutex::new(Vec::new()),
        }
    }

    fn vm_delete(mut self, behavior: VmDelete) -> Self {
        self.vm_delete = behavior;
        self
    }

    fn failing_nic_delete(mut self) -> Self {
        self.fail_nic_delete = true;
        self
    }

    fn creates(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    fn vm_deletes(&self) -> usize {
        self.vm_deletes.load(Ordering::SeqCst)
    }

    fn nic_deletes(&self) -> Vec<String> {
        self.nic_deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeClient for MockCompute {
    async fn create_virtual_machine(&self, params: &VmParams) -> Result<VmHandle> {
        self.creates.lock().unwrap().push(params.vm_name.clone());
        match self.outcome {
            CreateOutcome::Succeed => Ok(VmHandle {
                vm_name: params.vm_name.clone(),
                id: Some(format!("/virtualMachines/{}", params.vm_name)),
                location: params.location.clone(),
                provisioning_state: Some("Succeeded".into()),
            }),
            CreateOutcome::Generic => Err(Error::Cloud("virtual machine is not created".into())),
            CreateOutcome::Status(status) => Err(Error::Provisioning {
                status: status.into(),
                message: "OSProvisioningTimedOut".into(),
            }),
        }
    }

    async fn delete_virtual_machine(&self, _vm_name: &str) -> Result<()> {
        let call = self.vm_deletes.fetch_add(1, Ordering::SeqCst) + 1;
        match self.vm_delete {
            VmDelete::AlwaysFail => Err(Error::Cloud("cannot delete the vm".into())),
            VmDelete::FailFirstCall if call == 1 => Err(Error::Cloud("cannot delete the vm".into())),
            _ => Ok(()),
        }
    }

    async fn delete_network_interface(&self, nic_name: &str) -> Result<()> {
        self.nic_deletes.lock().unwrap().push(nic_name.to_string());
        if self.fail_nic_delete {
            return Err(Error::Cloud("cannot delete nic".into()));
        }
        Ok(())
    }
}

/// Disk operation a `MockDisks` fails on.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DiskFailure {
    OsDiskDelete,
    EphemeralLookup,
    EphemeralDelete,
    StatusDelete,
}

impl DiskFailure {
    fn message(self) -> &'static str {
        match self {
            Self::OsDiskDelete => "cannot delete the os disk",
            Self::EphemeralLookup => "cannot look up the ephemeral disk",
            Self::EphemeralDelete => "cannot delete the ephemeral disk",
            Self::StatusDelete => "cannot delete the status files",
        }
    }
}

struct MockDisks {
    kind: DiskKind,
    ephemeral_exists: bool,
    failure: Option<DiskFailure>,
    disk_deletes: Mutex<Vec<(String, String)>>,
    status_deletes: Mutex<Vec<(String, String)>>,
}

impl MockDisks {
    fn new(kind: DiskKind) -> Self {
        Self {
            kind,
            ephemeral_exists: true,
            failure: None,
            disk_deletes: Mutex::new(Vec::new()),
            status_deletes: Mutex::new(Vec::new()),
        }
    }

    fn without_ephemeral_disk(mut self) -> Self {
        self.ephemeral_exists = false;
        self
    }

    fn failing(mut self, failure: DiskFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    fn fail_on(&self, failure: DiskFailure) -> Result<()> {
        if self.failure == Some(failure) {
            return Err(Error::Cloud(failure.message().into()));
        }
        Ok(())
    }

    fn key(&self) -> &'static str {
        match self.kind {
            DiskKind::Managed => RESOURCE_GROUP,
            DiskKind::Unmanaged => STORAGE_ACCOUNT,
        }
    }

    fn disk_deletes(&self, disk_name: &str) -> usize {
        self.disk_deletes
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, name)| key == self.key() && name == disk_name)
            .count()
    }

    fn total_disk_deletes(&self) -> usize {
        self.disk_deletes.lock().unwrap().len()
    }

    fn status_deletes(&self) -> usize {
        self.status_deletes
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, vm)| key == self.key() && vm == VM_NAME)
            .count()
    }
}

#[async_trait]
impl DiskManager for MockDisks {
    fn kind(&self) -> DiskKind {
        self.kind
    }

    async fn delete_disk(&self, key: &str, disk_name: &str) -> Result<()> {
        self.disk_deletes
            .lock()
            .unwrap()
            .push((key.to_string(), disk_name.to_string()));
        match disk_name {
            OS_DISK => self.fail_on(DiskFailure::OsDiskDelete),
            EPHEMERAL_DISK => self.fail_on(DiskFailure::EphemeralDelete),
            _ => Ok(()),
        }
    }

    async fn ephemeral_disk(&self, instance_id: &InstanceId) -> Result<Option<DiskRef>> {
        assert_eq!(instance_id.vm_name(), VM_NAME);
        self.fail_on(DiskFailure::EphemeralLookup)?;
        Ok(self.ephemeral_exists.then(|| DiskRef {
            name: EPHEMERAL_DISK.into(),
        }))
    }

    fn has_status_files(&self) -> bool {
        self.kind == DiskKind::Unmanaged
    }

    async fn delete_vm_status_files(&self, key: &str, vm_name: &str) -> Result<()> {
        self.status_deletes
            .lock()
            .unwrap()
            .push((key.to_string(), vm_name.to_string()));
        self.fail_on(DiskFailure::StatusDelete)
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Harness {
    compute: Arc<MockCompute>,
    disks: Arc<MockDisks>,
    manager: VmManager,
}

fn harness(keep_failed_vms: bool, compute: MockCompute, disks: MockDisks) -> Harness {
    let compute = Arc::new(compute);
    let disks = Arc::new(disks);
    let settings = Settings {
        use_managed_disks: disks.kind == DiskKind::Managed,
        keep_failed_vms,
    };
    let manager = VmManager::new(settings, compute.clone(), disks.clone(), disks.key()).unwrap();

    Harness {
        compute,
        disks,
        manager,
    }
}

impl Harness {
    async fn create(&self) -> Result<VmHandle> {
        let stemcell = StemcellInfo {
            os_type: "Linux".into(),
            image_uri: Some("https://boshstore.blob.core.windows.net/stemcell/sc.vhd".into()),
            image_id: Some("/images/sc".into()),
        };
        let resource_pool = ResourcePool {
            instance_type: "Standard_D1_v2".into(),
            root_disk_size_gb: None,
            ephemeral_disk: EphemeralDiskSpec::default(),
            storage_account_type: "Standard_LRS".into(),
        };
        let network = NetworkConfigurator::new(vec![
            NetworkSpec {
                name: "default".into(),
            },
            NetworkSpec {
                name: "backend".into(),
            },
        ])
        .unwrap();

        self.manager
            .create(
                &InstanceId(VM_NAME.into()),
                "westeurope",
                &stemcell,
                &resource_pool,
                &network,
                &Environment::new(),
            )
            .await
    }
}

fn nics() -> Vec<String> {
    vec![format!("{VM_NAME}-0"), format!("{VM_NAME}-1")]
}

// ── Success ──────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_create_runs_no_cleanup() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Succeed),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let handle = h.create().await.unwrap();

    assert_eq!(handle.vm_name, VM_NAME);
    assert_eq!(handle.location, "westeurope");
    assert_eq!(h.compute.creates(), 1);
    assert_eq!(h.compute.vm_deletes(), 0);
    assert_eq!(h.disks.total_disk_deletes(), 0);
    assert!(h.compute.nic_deletes().is_empty());
}

// ── Generic failures ─────────────────────────────────────────────────

#[tokio::test]
async fn generic_error_cleans_up_everything_once_and_returns_it() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Generic),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert!(err.to_string().contains("virtual machine is not created"));
    assert_eq!(h.compute.creates(), 1);
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 1);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 1);
    assert_eq!(h.disks.status_deletes(), 1);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[tokio::test]
async fn generic_error_nic_failure_replaces_create_error() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Generic).failing_nic_delete(),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert_eq!(err.to_string(), "cannot delete nic");
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 1);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 1);
    assert_eq!(h.disks.status_deletes(), 1);
    assert_eq!(h.compute.nic_deletes().len(), 1);
}

#[tokio::test]
async fn generic_error_stops_cleanup_at_failing_step() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Generic),
        MockDisks::new(DiskKind::Unmanaged).failing(DiskFailure::OsDiskDelete),
    );

    let err = h.create().await.unwrap_err();

    assert_eq!(err.to_string(), "cannot delete the os disk");
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 0);
    assert_eq!(h.disks.status_deletes(), 0);
    assert!(h.compute.nic_deletes().is_empty());
}

#[tokio::test]
async fn generic_error_vm_delete_is_not_retried() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Generic).vm_delete(VmDelete::AlwaysFail),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert_eq!(err.to_string(), "cannot delete the vm");
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.total_disk_deletes(), 0);
    assert!(h.compute.nic_deletes().is_empty());
}

#[rstest]
#[case::keep(true)]
#[case::delete(false)]
#[tokio::test]
async fn non_failed_status_takes_single_pass_regardless_of_keep(#[case] keep_failed_vms: bool) {
    let h = harness(
        keep_failed_vms,
        MockCompute::new(CreateOutcome::Status("Canceled")),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert!(matches!(&err, Error::Provisioning { status, .. } if status == "Canceled"));
    assert!(!err.to_string().contains("are kept"));
    assert_eq!(h.compute.creates(), 1);
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 1);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 1);
    assert_eq!(h.disks.status_deletes(), 1);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[tokio::test]
async fn managed_generic_error_has_no_status_files() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Generic),
        MockDisks::new(DiskKind::Managed),
    );

    h.create().await.unwrap_err();

    assert_eq!(h.disks.disk_deletes(OS_DISK), 1);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 1);
    assert_eq!(h.disks.status_deletes(), 0);
    assert_eq!(h.compute.nic_deletes(), nics());
}

// ── Failed provisioning, resources not kept ──────────────────────────

#[tokio::test]
async fn failed_status_retries_three_times_then_deletes_nics_once() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    match &err {
        Error::RetriesExhausted {
            attempts, kept, cause, ..
        } => {
            assert_eq!(*attempts, 3);
            assert!(kept.is_none());
            assert!(matches!(**cause, Error::Provisioning { .. }));
        }
        other => panic!("expected exhausted retries, got {other}"),
    }
    assert!(err.to_string().contains("OSProvisioningTimedOut"));
    assert!(!err.to_string().contains("are kept"));

    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 3);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 3);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 3);
    assert_eq!(h.disks.status_deletes(), 3);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[tokio::test]
async fn every_attempt_uses_the_same_request() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Unmanaged),
    );

    h.create().await.unwrap_err();

    let creates = h.compute.creates.lock().unwrap().clone();
    assert_eq!(creates, vec![VM_NAME; 3]);
}

#[tokio::test]
async fn failed_status_without_ephemeral_disk_skips_its_deletion() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Unmanaged).without_ephemeral_disk(),
    );

    h.create().await.unwrap_err();

    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 3);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 3);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 0);
    assert_eq!(h.disks.status_deletes(), 3);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[rstest]
#[case::with_ephemeral(true, 3)]
#[case::without_ephemeral(false, 0)]
#[tokio::test]
async fn managed_failed_status_routes_by_resource_group(
    #[case] ephemeral_exists: bool,
    #[case] ephemeral_deletes: usize,
) {
    let mut disks = MockDisks::new(DiskKind::Managed);
    disks.ephemeral_exists = ephemeral_exists;
    let h = harness(false, MockCompute::new(CreateOutcome::Status("Failed")), disks);

    h.create().await.unwrap_err();

    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 3);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 3);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), ephemeral_deletes);
    assert_eq!(h.disks.status_deletes(), 0);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[tokio::test]
async fn vm_delete_failing_once_is_absorbed_by_its_retry() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Status("Failed")).vm_delete(VmDelete::FailFirstCall),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert!(matches!(err, Error::RetriesExhausted { kept: None, .. }));
    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 4);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 3);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 3);
    assert_eq!(h.disks.status_deletes(), 3);
    assert_eq!(h.compute.nic_deletes(), nics());
}

#[tokio::test]
async fn nic_failure_after_exhaustion_replaces_provisioning_error() {
    let h = harness(
        false,
        MockCompute::new(CreateOutcome::Status("Failed")).failing_nic_delete(),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert_eq!(err.to_string(), "cannot delete nic");
    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.nic_deletes().len(), 1);
}

// ── Failed provisioning, resources kept ──────────────────────────────

#[tokio::test]
async fn keep_failed_vms_leaves_last_attempt_and_nics() {
    let h = harness(
        true,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    match &err {
        Error::RetriesExhausted {
            kept: Some(kept), ..
        } => {
            assert_eq!(kept.reason, KeptReason::RetriesExhausted);
            assert_eq!(kept.vm_name, VM_NAME);
            assert_eq!(kept.os_disk, OS_DISK);
            assert_eq!(kept.nics, nics());
        }
        other => panic!("expected kept resources, got {other}"),
    }
    assert!(err.to_string().contains("are kept after exhausting provisioning retries"));

    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 2);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 2);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 2);
    assert_eq!(h.disks.status_deletes(), 2);
    assert!(h.compute.nic_deletes().is_empty());
}

#[tokio::test]
async fn keep_failed_vms_with_managed_disks() {
    let h = harness(
        true,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Managed).without_ephemeral_disk(),
    );

    let err = h.create().await.unwrap_err();

    assert!(err.to_string().contains("are kept"));
    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 2);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 2);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 0);
    assert_eq!(h.disks.status_deletes(), 0);
    assert!(h.compute.nic_deletes().is_empty());
}

#[tokio::test]
async fn keep_failed_vms_with_vm_delete_failing_once() {
    let h = harness(
        true,
        MockCompute::new(CreateOutcome::Status("Failed")).vm_delete(VmDelete::FailFirstCall),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    assert!(err.to_string().contains("are kept"));
    assert_eq!(h.compute.creates(), 3);
    assert_eq!(h.compute.vm_deletes(), 3);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 2);
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), 2);
    assert_eq!(h.disks.status_deletes(), 2);
    assert!(h.compute.nic_deletes().is_empty());
}

// ── Cleanup aborts ───────────────────────────────────────────────────

#[rstest]
#[case::keep(true)]
#[case::delete(false)]
#[tokio::test]
async fn undeletable_vm_aborts_and_keeps_resources(#[case] keep_failed_vms: bool) {
    let h = harness(
        keep_failed_vms,
        MockCompute::new(CreateOutcome::Status("Failed")).vm_delete(VmDelete::AlwaysFail),
        MockDisks::new(DiskKind::Unmanaged),
    );

    let err = h.create().await.unwrap_err();

    match &err {
        Error::CleanupAborted { step, kept, .. } => {
            assert_eq!(*step, CleanupStep::DeleteVm);
            assert_eq!(kept.reason, KeptReason::CleanupFailed);
        }
        other => panic!("expected aborted cleanup, got {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("cannot delete the vm"));
    assert!(message.contains("OSProvisioningTimedOut"));
    assert!(message.contains("are kept because cleanup could not complete"));

    assert_eq!(h.compute.creates(), 1);
    assert_eq!(h.compute.vm_deletes(), 3);
    assert_eq!(h.disks.total_disk_deletes(), 0);
    assert_eq!(h.disks.status_deletes(), 0);
    assert!(h.compute.nic_deletes().is_empty());
}

#[rstest]
#[case::os_disk(DiskFailure::OsDiskDelete, CleanupStep::DeleteOsDisk)]
#[case::ephemeral_lookup(DiskFailure::EphemeralLookup, CleanupStep::DeleteEphemeralDisk)]
#[case::ephemeral_disk(DiskFailure::EphemeralDelete, CleanupStep::DeleteEphemeralDisk)]
#[case::status_files(DiskFailure::StatusDelete, CleanupStep::DeleteStatusFiles)]
#[tokio::test]
async fn disk_step_failure_before_retry_aborts_like_vm_delete(
    #[case] failure: DiskFailure,
    #[case] failed_step: CleanupStep,
    #[values(true, false)] keep_failed_vms: bool,
) {
    let h = harness(
        keep_failed_vms,
        MockCompute::new(CreateOutcome::Status("Failed")),
        MockDisks::new(DiskKind::Unmanaged).failing(failure),
    );

    let err = h.create().await.unwrap_err();

    match &err {
        Error::CleanupAborted { step, kept, .. } => {
            assert_eq!(*step, failed_step);
            assert_eq!(kept.reason, KeptReason::CleanupFailed);
        }
        other => panic!("expected aborted cleanup, got {other}"),
    }
    assert!(err.to_string().contains(failure.message()));
    assert!(err.to_string().contains("OSProvisioningTimedOut"));

    assert_eq!(h.compute.creates(), 1);
    assert_eq!(h.compute.vm_deletes(), 1);
    assert_eq!(h.disks.disk_deletes(OS_DISK), 1);
    let ephemeral_deletes = usize::from(matches!(
        failure,
        DiskFailure::EphemeralDelete | DiskFailure::StatusDelete
    ));
    assert_eq!(h.disks.disk_deletes(EPHEMERAL_DISK), ephemeral_deletes);
    let status_deletes = usize::from(failure == DiskFailure::StatusDelete);
    assert_eq!(h.disks.status_deletes(), status_deletes);
    assert!(h.compute.nic_deletes().is_empty());
}

// ── Construction ─────────────────────────────────────────────────────

#[test]
fn rejects_disk_manager_of_the_wrong_kind() {
    let settings = Settings {
        use_managed_disks: true,
        keep_failed_vms: false,
    };
    let result = VmManager::new(
        settings,
        Arc::new(MockCompute::new(CreateOutcome::Succeed)),
        Arc::new(MockDisks::new(DiskKind::Unmanaged)),
        STORAGE_ACCOUNT,
    );

    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
