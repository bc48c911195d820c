//! Cleanup plans for failed create attempts.
//!
//! A plan is the ordered list of deletions to run after a failed attempt.
//! Which steps it holds depends on when cleanup runs and on whether the disk
//! mode keeps VM status blobs. Steps run strictly in order and the first
//! failing step ends the pass.

use std::fmt;

use crate::Error;

/// Delete tries granted to the VM deletion of a per-attempt cleanup.
pub const MAX_VM_DELETE_TRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    DeleteVm,
    DeleteOsDisk,
    /// Only acts when the disk manager reports the disk exists.
    DeleteEphemeralDisk,
    DeleteStatusFiles,
    DeleteNics,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeleteVm => "deleting the virtual machine",
            Self::DeleteOsDisk => "deleting the OS disk",
            Self::DeleteEphemeralDisk => "deleting the ephemeral disk",
            Self::DeleteStatusFiles => "deleting the VM status files",
            Self::DeleteNics => "deleting the network interfaces",
        })
    }
}

/// When in the create protocol a cleanup pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupScope {
    /// After a generic failure; runs once and also removes the NICs.
    SinglePass,
    /// After a `Failed` provisioning status, before the next attempt. NICs
    /// survive so the retry can reuse them.
    PerAttempt,
}

impl CleanupScope {
    pub fn vm_delete_tries(&self) -> u32 {
        match self {
            Self::SinglePass => 1,
            Self::PerAttempt => MAX_VM_DELETE_TRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupPlan {
    steps: Vec<CleanupStep>,
}

impl CleanupPlan {
    pub fn new(scope: CleanupScope, has_status_files: bool) -> Self {
        let mut steps = vec![
            CleanupStep::DeleteVm,
            CleanupStep::DeleteOsDisk,
            CleanupStep::DeleteEphemeralDisk,
        ];
        if has_status_files {
            steps.push(CleanupStep::DeleteStatusFiles);
        }
        if scope == CleanupScope::SinglePass {
            steps.push(CleanupStep::DeleteNics);
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[CleanupStep] {
        &self.steps
    }
}

/// The step that ended a cleanup pass, with its error.
#[derive(Debug)]
pub struct CleanupFailure {
    pub step: CleanupStep,
    pub error: Error,
}
