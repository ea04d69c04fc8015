use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a device configuration could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("authentication failed: {message}")]
    AuthFailure { message: String },
    #[error("device unreachable: {message}")]
    Unreachable { message: String },
}

impl FetchError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        FetchError::Unreachable {
            message: message.into(),
        }
    }
}

/// Source of live or versioned device configuration text.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// Full configuration of `device_id`; `version` selects a stored
    /// on-device revision instead of the running configuration.
    async fn fetch(&self, device_id: &str, version: Option<&str>) -> Result<String, FetchError>;
}

/// Reads `<root>/<device>.conf`, or `<root>/<device>@<version>.conf` for a
/// versioned fetch.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, device_id: &str, version: Option<&str>) -> PathBuf {
        match version {
            Some(version) => self.root.join(format!("{device_id}@{version}.conf")),
            None => self.root.join(format!("{device_id}.conf")),
        }
    }
}

#[async_trait]
impl ConfigFetcher for DirectoryFetcher {
    async fn fetch(&self, device_id: &str, version: Option<&str>) -> Result<String, FetchError> {
        let path = self.path_for(device_id, version);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::PermissionDenied => FetchError::AuthFailure {
                    message: format!("{}: {err}", path.display()),
                },
                _ => FetchError::unreachable(format!("{}: {err}", path.display())),
            })
    }
}

/// Fetcher used when no live source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetcher;

#[async_trait]
impl ConfigFetcher for NoFetcher {
    async fn fetch(&self, device_id: &str, _version: Option<&str>) -> Result<String, FetchError> {
        Err(FetchError::unreachable(format!(
            "no live configuration source configured for {device_id}"
        )))
    }
}

/// Result of fetching one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub device_id: String,
    pub result: Result<String, FetchError>,
}

/// Fetch every device concurrently, each bounded by `timeout`.
///
/// Outcomes come back in the order of `devices`; one slow or failing device
/// never holds up the others past its own timeout.
pub async fn fetch_all(
    fetcher: Arc<dyn ConfigFetcher>,
    devices: &[String],
    version: Option<&str>,
    timeout: Duration,
) -> Vec<FetchOutcome> {
    let tasks = devices.iter().map(|device_id| {
        let fetcher = Arc::clone(&fetcher);
        let device_id = device_id.clone();
        let version = version.map(ToString::to_string);
        tokio::spawn(async move {
            let result =
                match tokio::time::timeout(timeout, fetcher.fetch(&device_id, version.as_deref()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                };
            match &result {
                Ok(text) => debug!(device = %device_id, bytes = text.len(), "fetched configuration"),
                Err(err) => warn!(device = %device_id, error = %err, "fetch failed"),
            }
            FetchOutcome { device_id, result }
        })
    });

    join_all(tasks)
        .await
        .into_iter()
        .zip(devices)
        .map(|(joined, device_id)| {
            joined.unwrap_or_else(|err| FetchOutcome {
                device_id: device_id.clone(),
                result: Err(FetchError::unreachable(format!("fetch task failed: {err}"))),
            })
        })
        .collect()
}
