//! Typed Rust client for the Azure Resource Manager and Blob Storage REST APIs.
//!
//! Covers the subset needed by the CPI create path:
//! virtual machines (create, get, delete), network interfaces (delete),
//! managed disks (get, delete) and storage blobs (exists, list, delete).

mod storage;
mod types;

use std::time::Duration;

pub use storage::*;
pub use types::*;

use tokio::time::Instant;
use tracing::debug;

const BASE_URL: &str = "https://management.azure.com";
const COMPUTE_API_VERSION: &str = "2018-04-01";
const NETWORK_API_VERSION: &str = "2017-09-01";
const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const RETRY_AFTER_HEADER: &str = "Retry-After";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Terminal status Azure reports for an async operation that failed to provision.
pub const PROVISIONING_STATE_FAILED: &str = "Failed";
pub const PROVISIONING_STATE_SUCCEEDED: &str = "Succeeded";
pub const PROVISIONING_STATE_CANCELED: &str = "Canceled";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("azure api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("azure api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("azure async operation {endpoint} finished with status {status}: {body}")]
    AsyncOperation {
        endpoint: &'static str,
        status: String,
        body: String,
    },

    #[error("azure api {endpoint} returned an undecodable body: {source}")]
    Decode {
        endpoint: &'static str,
        source: serde_json::Error,
    },

    #[error("azure {endpoint} did not finish within {waited:?}")]
    Timeout {
        endpoint: &'static str,
        waited: Duration,
    },

    #[error("invalid storage access key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Azure Resource Manager REST API, scoped to one resource group.
#[derive(Clone)]
pub struct AzureClient {
    token: String,
    subscription_id: String,
    resource_group: String,
    base_url: String,
    poll_interval: Duration,
    operation_timeout: Duration,
    http: reqwest::Client,
}

impl AzureClient {
    pub fn new(
        token: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            base_url: BASE_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at another endpoint (sovereign clouds, local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Upper bound on waiting for one long-running operation to settle.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// ARM resource id of a resource living in this client's resource group.
    pub fn resource_id(&self, provider: &str, kind: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{provider}/{kind}/{name}",
            self.subscription_id, self.resource_group
        )
    }

    fn url(&self, provider: &str, kind: &str, name: &str, api_version: &str) -> String {
        format!(
            "{}{}?api-version={api_version}",
            self.base_url,
            self.resource_id(provider, kind, name)
        )
    }

    fn vm_url(&self, name: &str) -> String {
        self.url("Microsoft.Compute", "virtualMachines", name, COMPUTE_API_VERSION)
    }

    fn disk_url(&self, name: &str) -> String {
        self.url("Microsoft.Compute", "disks", name, COMPUTE_API_VERSION)
    }

    fn nic_url(&self, name: &str) -> String {
        self.url(
            "Microsoft.Network",
            "networkInterfaces",
            name,
            NETWORK_API_VERSION,
        )
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    fn async_operation_url(resp: &reqwest::Response) -> Option<String> {
        resp.headers()
            .get(ASYNC_OPERATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Server-requested delay before the next poll, in whole seconds.
    fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
        resp.headers()
            .get(RETRY_AFTER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Sleep before the next poll, or fail once the operation timeout is spent.
    async fn pause(&self, started: Instant, delay: Duration, endpoint: &'static str) -> Result<()> {
        let remaining = self.operation_timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(Error::Timeout {
                endpoint,
                waited: started.elapsed(),
            });
        }
        tokio::time::sleep(delay.min(remaining)).await;
        Ok(())
    }

    /// Poll an `Azure-AsyncOperation` URL until it leaves `InProgress`.
    ///
    /// Any terminal status other than `Succeeded` is reported as
    /// [`Error::AsyncOperation`] carrying that status. Honors `Retry-After`
    /// and gives up with [`Error::Timeout`] after the operation timeout.
    async fn wait_for_operation(&self, operation_url: &str, endpoint: &'static str) -> Result<()> {
        let started = Instant::now();
        loop {
            let resp = self
                .http
                .get(operation_url)
                .header("Authorization", self.auth())
                .send()
                .await?;

            let resp = Self::check(resp, endpoint).await?;
            let delay = Self::retry_after(&resp).unwrap_or(self.poll_interval);
            let body = resp.text().await?;
            let operation: AsyncOperation = serde_json::from_str(&body)
                .map_err(|source| Error::Decode { endpoint, source })?;

            match operation.status.as_str() {
                "InProgress" => {
                    debug!(endpoint, ?delay, "azure: async operation in progress");
                    self.pause(started, delay, endpoint).await?;
                }
                PROVISIONING_STATE_SUCCEEDED => return Ok(()),
                _ => {
                    return Err(Error::AsyncOperation {
                        endpoint,
                        status: operation.status,
                        body,
                    });
                }
            }
        }
    }

    /// Issue a DELETE, treating 404 as success and waiting out any async operation.
    async fn delete_resource(&self, url: String, endpoint: &'static str) -> Result<()> {
        let resp = self
            .http
            .delete(url)
            .header("Authorization", self.auth())
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(endpoint, "azure: resource already gone");
            return Ok(());
        }

        let resp = Self::check(resp, endpoint).await?;
        if let Some(operation) = Self::async_operation_url(&resp) {
            self.wait_for_operation(&operation, endpoint).await?;
        }
        Ok(())
    }

    // ── Virtual machines ─────────────────────────────────────────────

    /// Create a VM and wait for provisioning to reach a terminal state.
    pub async fn create_virtual_machine(
        &self,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine> {
        let resp = self
            .http
            .put(self.vm_url(name))
            .header("Authorization", self.auth())
            .json(vm)
            .send()
            .await?;

        let resp = Self::check(resp, "create virtual machine").await?;
        if let Some(operation) = Self::async_operation_url(&resp) {
            self.wait_for_operation(&operation, "create virtual machine")
                .await?;
        }

        self.wait_for_provisioning(name).await
    }

    /// Fetch the VM until its own provisioning state is terminal.
    ///
    /// A PUT answered without an async operation header still reports the
    /// outcome here; `Failed` and `Canceled` become [`Error::AsyncOperation`].
    async fn wait_for_provisioning(&self, name: &str) -> Result<VirtualMachine> {
        const ENDPOINT: &str = "create virtual machine";
        let started = Instant::now();

        loop {
            let vm = self.get_virtual_machine(name).await?;
            let state = vm.properties.provisioning_state.clone();

            match state.as_deref() {
                None | Some(PROVISIONING_STATE_SUCCEEDED) => return Ok(vm),
                Some(status @ (PROVISIONING_STATE_FAILED | PROVISIONING_STATE_CANCELED)) => {
                    return Err(Error::AsyncOperation {
                        endpoint: ENDPOINT,
                        status: status.to_string(),
                        body: serde_json::to_string(&vm).unwrap_or_default(),
                    });
                }
                Some(pending) => {
                    debug!(vm_name = name, state = pending, "azure: virtual machine still provisioning");
                    self.pause(started, self.poll_interval, ENDPOINT).await?;
                }
            }
        }
    }

    pub async fn get_virtual_machine(&self, name: &str) -> Result<VirtualMachine> {
        let resp = self
            .http
            .get(self.vm_url(name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, "get virtual machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn delete_virtual_machine(&self, name: &str) -> Result<()> {
        self.delete_resource(self.vm_url(name), "delete virtual machine")
            .await
    }

    // ── Network interfaces ───────────────────────────────────────────

    pub async fn delete_network_interface(&self, name: &str) -> Result<()> {
        self.delete_resource(self.nic_url(name), "delete network interface")
            .await
    }

    // ── Managed disks ────────────────────────────────────────────────

    /// Look up a managed disk; `None` when it does not exist.
    pub async fn get_managed_disk(&self, name: &str) -> Result<Option<ManagedDisk>> {
        let resp = self
            .http
            .get(self.disk_url(name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let disk = Self::check(resp, "get managed disk").await?.json().await?;
        Ok(Some(disk))
    }

    pub async fn delete_managed_disk(&self, name: &str) -> Result<()> {
        self.delete_resource(self.disk_url(name), "delete managed disk")
            .await
    }
}
