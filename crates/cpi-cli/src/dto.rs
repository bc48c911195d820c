use cpi_infra::network::NetworkSpec;
use cpi_infra::types::{Environment, InstanceId, ResourcePool, StemcellInfo};
use serde::Deserialize;

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateVmRequest {
    #[serde(default)]
    pub instance_id: Option<InstanceId>,
    pub location: String,
    pub stemcell: StemcellInfo,
    pub resource_pool: ResourcePool,
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub env: Environment,
}

impl CreateVmRequest {
    /// The requested instance id, or a fresh one.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id.clone().unwrap_or_else(InstanceId::generate)
    }
}
