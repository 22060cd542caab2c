use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Template kind discriminators
pub mod template_kind {
    /// Plain text-substitution template
    pub const GO: &str = "go";
    /// Structured config expanded by an external backend
    pub const NETJSON: &str = "netjson";
}

/// Template represents a named unit of configuration content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub body: String,
    pub kind: String,
    pub required: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateTemplateRequest for creating/updating templates
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_kind() -> String {
    template_kind::GO.to_string()
}

/// A device- or group-scoped link granting a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateAssignment {
    pub id: i64,
    pub template_id: i64,
    pub enabled: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// AssignTemplateRequest links a template to a device or group
#[derive(Debug, Clone, Deserialize)]
pub struct AssignTemplateRequest {
    pub template_id: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sort_order")]
    pub sort_order: i32,
}

fn default_enabled() -> bool {
    true
}

fn default_sort_order() -> i32 {
    100
}

/// Reorder request item: template -> new sort order
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderItem {
    pub template_id: i64,
    pub sort_order: i32,
}
