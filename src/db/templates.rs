use std::collections::HashMap;

use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use super::row_helpers::map_template_row;
use crate::models::{CreateTemplateRequest, ReorderItem, Template, TemplateAssignment};

fn map_assignment_row(row: &SqliteRow) -> TemplateAssignment {
    TemplateAssignment {
        id: row.get("id"),
        template_id: row.get("template_id"),
        enabled: row.get("enabled"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    }
}

const TEMPLATE_COLS: &str =
    "id, name, path, body, kind, required, is_default, created_at, updated_at";

pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn create(pool: &Pool<Sqlite>, req: &CreateTemplateRequest) -> Result<Template> {
        let res = sqlx::query(
            r#"
            INSERT INTO templates (name, path, body, kind, required, is_default, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(&req.name)
        .bind(&req.path)
        .bind(&req.body)
        .bind(&req.kind)
        .bind(req.required)
        .bind(req.is_default)
        .execute(pool)
        .await?;

        let id = res.last_insert_rowid();
        Self::get(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("template vanished after insert: {}", id))
    }

    /// Live templates only — soft-deleted rows are invisible everywhere.
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM templates WHERE deleted_at IS NULL ORDER BY name",
            TEMPLATE_COLS
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_template_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Template>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM templates WHERE id = ? AND deleted_at IS NULL",
            TEMPLATE_COLS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_template_row))
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        req: &CreateTemplateRequest,
    ) -> Result<Option<Template>> {
        let res = sqlx::query(
            r#"
            UPDATE templates
            SET name = ?, path = ?, body = ?, kind = ?, required = ?, is_default = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&req.name)
        .bind(&req.path)
        .bind(&req.body)
        .bind(&req.kind)
        .bind(req.required)
        .bind(req.is_default)
        .bind(id)
        .execute(pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get(pool, id).await
    }

    /// Soft delete: the row stays for audit, a new template may reuse the name.
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE templates SET deleted_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_required(pool: &Pool<Sqlite>) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM templates WHERE deleted_at IS NULL AND required = 1 ORDER BY id",
            TEMPLATE_COLS
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_template_row).collect())
    }

    pub async fn list_default(pool: &Pool<Sqlite>) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM templates WHERE deleted_at IS NULL AND is_default = 1 ORDER BY id",
            TEMPLATE_COLS
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_template_row).collect())
    }

    /// Enabled assignments for a device, in application order.
    pub async fn device_assignments(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
    ) -> Result<Vec<TemplateAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.template_id, a.enabled, a.sort_order, a.created_at
            FROM device_template_assignments a
            JOIN templates t ON t.id = a.template_id AND t.deleted_at IS NULL
            WHERE a.device_uuid = ? AND a.enabled = 1
            ORDER BY a.sort_order, a.id
            "#,
        )
        .bind(device_uuid)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_assignment_row).collect())
    }

    pub async fn group_assignments(
        pool: &Pool<Sqlite>,
        group_id: i64,
    ) -> Result<Vec<TemplateAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.template_id, a.enabled, a.sort_order, a.created_at
            FROM group_template_assignments a
            JOIN templates t ON t.id = a.template_id AND t.deleted_at IS NULL
            WHERE a.group_id = ? AND a.enabled = 1
            ORDER BY a.sort_order, a.id
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_assignment_row).collect())
    }

    /// Enabled assignments across all of a device's groups, ordered as one
    /// list by (sort_order, assignment id) rather than per group.
    pub async fn group_assignments_for_groups(
        pool: &Pool<Sqlite>,
        group_ids: &[i64],
    ) -> Result<Vec<TemplateAssignment>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; group_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT a.id, a.template_id, a.enabled, a.sort_order, a.created_at
            FROM group_template_assignments a
            JOIN templates t ON t.id = a.template_id AND t.deleted_at IS NULL
            WHERE a.group_id IN ({}) AND a.enabled = 1
            ORDER BY a.sort_order, a.id
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for gid in group_ids {
            query = query.bind(*gid);
        }
        let rows = query.fetch_all(pool).await?;

        Ok(rows.iter().map(map_assignment_row).collect())
    }

    pub async fn assign_to_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        template_id: i64,
        enabled: bool,
        sort_order: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_template_assignments (device_uuid, template_id, enabled, sort_order)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(device_uuid, template_id)
            DO UPDATE SET enabled = excluded.enabled, sort_order = excluded.sort_order
            "#,
        )
        .bind(device_uuid)
        .bind(template_id)
        .bind(enabled)
        .bind(sort_order)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn unassign_from_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM device_template_assignments WHERE device_uuid = ? AND template_id = ?",
        )
        .bind(device_uuid)
        .bind(template_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn assign_to_group(
        pool: &Pool<Sqlite>,
        group_id: i64,
        template_id: i64,
        enabled: bool,
        sort_order: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_template_assignments (group_id, template_id, enabled, sort_order)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(group_id, template_id)
            DO UPDATE SET enabled = excluded.enabled, sort_order = excluded.sort_order
            "#,
        )
        .bind(group_id)
        .bind(template_id)
        .bind(enabled)
        .bind(sort_order)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn unassign_from_group(
        pool: &Pool<Sqlite>,
        group_id: i64,
        template_id: i64,
    ) -> Result<()> {
        sqlx::query("DELETE FROM group_template_assignments WHERE group_id = ? AND template_id = ?")
            .bind(group_id)
            .bind(template_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Template IDs this device has opted out of (group-granted only).
    pub async fn device_blocks(pool: &Pool<Sqlite>, device_uuid: &str) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT template_id FROM device_template_blocks WHERE device_uuid = ? ORDER BY template_id",
        )
        .bind(device_uuid)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn block_for_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO device_template_blocks (device_uuid, template_id) VALUES (?, ?)",
        )
        .bind(device_uuid)
        .bind(template_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn unblock_for_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        sqlx::query("DELETE FROM device_template_blocks WHERE device_uuid = ? AND template_id = ?")
            .bind(device_uuid)
            .bind(template_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn by_ids(pool: &Pool<Sqlite>, ids: &[i64]) -> Result<HashMap<i64, Template>> {
        let mut out = HashMap::new();
        for id in ids {
            if let Some(t) = Self::get(pool, *id).await? {
                out.insert(*id, t);
            }
        }
        Ok(out)
    }

    pub async fn reorder_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        items: &[ReorderItem],
    ) -> Result<()> {
        let mut tx = pool.begin().await?;
        for item in items {
            sqlx::query(
                "UPDATE device_template_assignments SET sort_order = ? WHERE device_uuid = ? AND template_id = ?",
            )
            .bind(item.sort_order)
            .bind(device_uuid)
            .bind(item.template_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
