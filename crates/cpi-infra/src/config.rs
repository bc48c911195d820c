use std::time::Duration;

use crate::{Error, Result};

/// Create-path policy consumed by [`crate::vm_manager::VmManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Selects the managed disk manager and routes disks by resource group.
    pub use_managed_disks: bool,
    /// Leave the last failed VM (and its NICs) in place for postmortem.
    pub keep_failed_vms: bool,
}

/// Azure account and CPI options.
#[derive(Debug, Clone)]
pub struct AzureProperties {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub access_token: String,
    pub resource_manager_endpoint: Option<String>,
    pub use_managed_disks: bool,
    pub keep_failed_vms: bool,
    pub storage_account_name: Option<String>,
    pub storage_access_key: Option<String>,
    pub ssh_user: String,
    pub ssh_public_key: Option<String>,
    pub poll_interval: Duration,
    pub operation_timeout: Duration,
}

impl AzureProperties {
    /// Load from env vars (after reading `.env` if present):
    ///
    /// - `AZURE_SUBSCRIPTION_ID`, `AZURE_RESOURCE_GROUP_NAME`, `AZURE_ACCESS_TOKEN` (required)
    /// - `AZURE_RESOURCE_MANAGER_ENDPOINT` (optional)
    /// - `AZURE_USE_MANAGED_DISKS`, `AZURE_KEEP_FAILED_VMS` (default: `false`)
    /// - `AZURE_STORAGE_ACCOUNT_NAME`, `AZURE_STORAGE_ACCESS_KEY` (required for unmanaged disks)
    /// - `AZURE_SSH_USER` (default: `"vcap"`), `AZURE_SSH_PUBLIC_KEY` (optional)
    /// - `AZURE_POLL_INTERVAL_SECS` (default: `5`)
    /// - `AZURE_OPERATION_TIMEOUT_SECS` (default: `1800`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required =
            |name: &str| get(name).ok_or_else(|| Error::MissingEnv(name.to_string()));

        let use_managed_disks = parse_bool("AZURE_USE_MANAGED_DISKS", get("AZURE_USE_MANAGED_DISKS"))?;

        let (storage_account_name, storage_access_key) = if use_managed_disks {
            (get("AZURE_STORAGE_ACCOUNT_NAME"), get("AZURE_STORAGE_ACCESS_KEY"))
        } else {
            (
                Some(required("AZURE_STORAGE_ACCOUNT_NAME")?),
                Some(required("AZURE_STORAGE_ACCESS_KEY")?),
            )
        };

        let poll_interval = parse_secs("AZURE_POLL_INTERVAL_SECS", get("AZURE_POLL_INTERVAL_SECS"), 5)?;
        let operation_timeout = parse_secs(
            "AZURE_OPERATION_TIMEOUT_SECS",
            get("AZURE_OPERATION_TIMEOUT_SECS"),
            30 * 60,
        )?;

        Ok(Self {
            subscription_id: required("AZURE_SUBSCRIPTION_ID")?,
            resource_group_name: required("AZURE_RESOURCE_GROUP_NAME")?,
            access_token: required("AZURE_ACCESS_TOKEN")?,
            resource_manager_endpoint: get("AZURE_RESOURCE_MANAGER_ENDPOINT"),
            use_managed_disks,
            keep_failed_vms: parse_bool("AZURE_KEEP_FAILED_VMS", get("AZURE_KEEP_FAILED_VMS"))?,
            storage_account_name,
            storage_access_key,
            ssh_user: get("AZURE_SSH_USER").unwrap_or_else(|| "vcap".into()),
            ssh_public_key: get("AZURE_SSH_PUBLIC_KEY"),
            poll_interval,
            operation_timeout,
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            use_managed_disks: self.use_managed_disks,
            keep_failed_vms: self.keep_failed_vms,
        }
    }
}

fn parse_secs(name: &str, raw: Option<String>, default: u64) -> Result<Duration> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| Error::InvalidConfig(format!("{name} is not a number: {raw}"))),
        None => Ok(Duration::from_secs(default)),
    }
}

fn parse_bool(name: &str, raw: Option<String>) -> Result<bool> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") => {
            Ok(true)
        }
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("no") => {
            Ok(false)
        }
        Some(v) => Err(Error::InvalidConfig(format!("{name} is not a boolean: {v}"))),
    }
}
