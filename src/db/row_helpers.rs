use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None — used when DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

pub fn map_device_row(row: &SqliteRow) -> Device {
    Device {
        id: row.get("id"),
        uuid: row.get("uuid"),
        device_key: row.get("device_key"),
        name: row.get("name"),
        backend: row.get("backend"),
        mac: row.get("mac"),
        status: row.get("status"),
        last_config_sha: row.get("last_config_sha"),
        last_error: none_if_empty(row.get("last_error")),
        last_seen: row.get("last_seen"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_template_row(row: &SqliteRow) -> Template {
    Template {
        id: row.get("id"),
        name: row.get("name"),
        path: row.get("path"),
        body: row.get("body"),
        kind: row.get("kind"),
        required: row.get("required"),
        is_default: row.get("is_default"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_prefix_row(row: &SqliteRow) -> Prefix {
    Prefix {
        id: row.get("id"),
        cidr: row.get("cidr"),
        parent_id: row.get("parent_id"),
        family: row.get("family"),
        note: none_if_empty(row.get("note")),
        created_at: row.get("created_at"),
    }
}
