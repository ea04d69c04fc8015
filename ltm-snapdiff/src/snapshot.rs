use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::section::{ObjectSection, SectionError, SectionParser};

/// Capture outcome of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Every requested device was captured.
    Success,
    /// Some devices failed to capture; the rest are stored.
    Partial,
    /// No device could be captured.
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Success => "success",
            SnapshotStatus::Partial => "partial",
            SnapshotStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(SnapshotStatus::Success),
            "partial" => Some(SnapshotStatus::Partial),
            "failed" => Some(SnapshotStatus::Failed),
            _ => None,
        }
    }
}

/// Parsed configuration of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub sections: Vec<ObjectSection>,
}

/// A device that could not be captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureError {
    pub device_id: String,
    pub message: String,
}

/// Immutable point-in-time capture of one or more devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub status: SnapshotStatus,
    pub devices: Vec<DeviceConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CaptureError>,
}

impl Snapshot {
    /// Parse every raw configuration and assemble a new snapshot.
    ///
    /// Nothing is returned unless all texts parse.
    pub fn capture(parser: &SectionParser, request: BackupRequest) -> Result<Self, BackupError> {
        let mut devices = Vec::with_capacity(request.configs.len());
        for raw in request.configs {
            let sections = parser
                .parse(&raw.text)
                .map_err(|source| BackupError::Parse {
                    device_id: raw.device_id.clone(),
                    source,
                })?;
            devices.push(DeviceConfig {
                device_id: raw.device_id,
                sections,
            });
        }
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let status = if devices.is_empty() {
            SnapshotStatus::Failed
        } else if request.failures.is_empty() {
            SnapshotStatus::Success
        } else {
            SnapshotStatus::Partial
        };

        Ok(Self {
            id: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            author: request.author,
            comment: request.comment,
            status,
            devices,
            errors: request.failures,
        })
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|device| device.device_id == device_id)
    }

    pub fn device_ids(&self) -> Vec<&str> {
        self.devices.iter().map(|d| d.device_id.as_str()).collect()
    }

    /// Total number of objects across devices.
    pub fn object_count(&self) -> usize {
        self.devices
            .iter()
            .flat_map(|device| device.sections.iter())
            .map(ObjectSection::len)
            .sum()
    }
}

/// Raw configuration text of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub device_id: String,
    pub text: String,
}

impl RawConfig {
    pub fn new(device_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            text: text.into(),
        }
    }
}

/// Input of a backup: captured texts plus devices that failed to capture.
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    pub author: String,
    pub comment: Option<String>,
    pub configs: Vec<RawConfig>,
    pub failures: Vec<CaptureError>,
}

/// Errors raised while creating a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration of device '{device_id}' is malformed: {source}")]
    Parse {
        device_id: String,
        #[source]
        source: SectionError,
    },
    #[error(transparent)]
    Storage(#[from] crate::store::StorageError),
}
