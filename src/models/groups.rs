use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group of devices sharing variables, templates and an optional prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateGroupRequest for creating/updating groups
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Key/value variable scoped to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceVariable {
    pub id: i64,
    pub device_uuid: String,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key/value variable scoped to a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupVariable {
    pub id: i64,
    pub group_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide operator default variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SetVariableRequest for upserting a variable at any scope
#[derive(Debug, Clone, Deserialize)]
pub struct SetVariableRequest {
    pub key: String,
    pub value: String,
}

/// One layer in the variable resolution stack, for the inspector API
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionLayer {
    pub source: String,
    pub source_type: String,
    pub variables: std::collections::HashMap<String, String>,
}

/// Full resolution result with provenance
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedVariablesResponse {
    pub variables: std::collections::HashMap<String, String>,
    pub resolution_order: Vec<ResolutionLayer>,
}
