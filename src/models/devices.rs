use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device represents a managed OpenWrt-class appliance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing)]
    pub device_key: String,
    pub name: String,
    pub backend: String,
    pub mac: String,
    pub status: String,
    pub last_config_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a device submits at registration time
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub mac: String,
}

/// One immutable row in the status audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    pub id: i64,
    pub device_uuid: String,
    pub status: String,
    pub config_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
