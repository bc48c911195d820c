use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One network the VM is attached to.
///
/// The NIC for each network exists before the create call; only the network
/// name and position matter here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
}

/// Ordered networks of a create request.
///
/// Names one NIC per network, in network order. The first network's NIC is
/// the primary one.
#[derive(Debug, Clone)]
pub struct NetworkConfigurator {
    networks: Vec<NetworkSpec>,
}

impl NetworkConfigurator {
    pub fn new(networks: Vec<NetworkSpec>) -> Result<Self> {
        if networks.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one network is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for network in &networks {
            if network.name.trim().is_empty() {
                return Err(Error::InvalidConfig("network name is empty".into()));
            }
            if !seen.insert(network.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "network {} is listed twice",
                    network.name
                )));
            }
        }

        Ok(Self { networks })
    }

    pub fn nic_names(&self, vm_name: &str) -> Vec<String> {
        (0..self.networks.len())
            .map(|index| format!("{vm_name}-{index}"))
            .collect()
    }
}
