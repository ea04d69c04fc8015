use serde::{Deserialize, Serialize};

/// A managed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    /// Human readable name; falls back to the id.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

impl DeviceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            host: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Lookup of the devices known to the tool.
pub trait DeviceRegistry: Send + Sync {
    fn list_devices(&self) -> Vec<DeviceRef>;

    fn display_name(&self, device_id: &str) -> String {
        self.list_devices()
            .into_iter()
            .find(|device| device.id == device_id)
            .map_or_else(|| device_id.to_string(), |d| d.display_name().to_string())
    }
}

/// Registry backed by a fixed list, usually the `[[device]]` config entries.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    devices: Vec<DeviceRef>,
}

impl StaticRegistry {
    pub fn new(devices: Vec<DeviceRef>) -> Self {
        Self { devices }
    }
}

impl DeviceRegistry for StaticRegistry {
    fn list_devices(&self) -> Vec<DeviceRef> {
        self.devices.clone()
    }
}
