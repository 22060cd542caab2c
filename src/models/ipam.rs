use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Address families. Only IPv4 is managed today; IPv6 CIDRs are
/// rejected at prefix creation.
pub mod family {
    pub const IPV4: &str = "ipv4";
}

/// A CIDR block, possibly subdivided into child prefixes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prefix {
    pub id: i64,
    pub cidr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// CreatePrefixRequest for root prefixes
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrefixRequest {
    pub cidr: String,
    #[serde(default)]
    pub note: String,
}

/// AllocateChildRequest subdivides a parent prefix
#[derive(Debug, Clone, Deserialize)]
pub struct AllocateChildRequest {
    pub prefix_length: u8,
    #[serde(default)]
    pub note: String,
}

/// AssignPrefixRequest allocates a child and binds it to a group
#[derive(Debug, Clone, Deserialize)]
pub struct AssignPrefixRequest {
    pub group_id: i64,
    pub prefix_length: u8,
    #[serde(default)]
    pub note: String,
}

/// A single address leased to one device within a prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub id: i64,
    pub device_uuid: String,
    pub prefix_id: i64,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// AssignAddressRequest leases the next free address from a group's prefix
#[derive(Debug, Clone, Deserialize)]
pub struct AssignAddressRequest {
    pub group_id: i64,
    pub device_uuid: String,
}
