use crate::error::UnknownStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DEVICE_KIND: &str = "ESP32";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Active,
    Inactive,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DeviceStatus::Active),
            "inactive" => Ok(DeviceStatus::Inactive),
            "offline" => Ok(DeviceStatus::Offline),
            _ => Err(UnknownStatus {
                entity: "device",
                value: s.to_owned(),
            }),
        }
    }
}

/// A registered transmitter, addressed by its unique topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub topic: String,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub kind: Option<String>,
    pub topic: String,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    pub status: Option<DeviceStatus>,
}

impl NewDevice {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        NewDevice {
            name: name.into(),
            kind: None,
            topic: topic.into(),
            mac_address: None,
            description: None,
            status: None,
        }
    }

    pub fn kind_or_default(&self) -> &str {
        self.kind.as_deref().unwrap_or(DEFAULT_DEVICE_KIND)
    }

    pub fn status_or_default(&self) -> DeviceStatus {
        self.status.unwrap_or_default()
    }
}

/// Partial update, `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub topic: Option<String>,
    pub mac_address: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub status: Option<DeviceStatus>,
}

impl DeviceUpdate {
    pub fn apply(&self, device: &Device) -> Device {
        Device {
            id: device.id,
            name: self.name.clone().unwrap_or_else(|| device.name.clone()),
            kind: self.kind.clone().unwrap_or_else(|| device.kind.clone()),
            topic: self.topic.clone().unwrap_or_else(|| device.topic.clone()),
            mac_address: self
                .mac_address
                .clone()
                .unwrap_or_else(|| device.mac_address.clone()),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| device.description.clone()),
            status: self.status.unwrap_or(device.status),
            last_seen: device.last_seen,
        }
    }
}
