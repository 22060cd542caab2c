use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use super::row_helpers::{map_device_row, none_if_empty};
use crate::models::{CreateGroupRequest, Device, Group};

fn map_group_row(row: &SqliteRow) -> Group {
    Group {
        id: row.get("id"),
        name: row.get("name"),
        description: none_if_empty(row.get("description")),
        device_count: row.try_get::<Option<i32>, _>("device_count").ok().flatten(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct GroupRepo;

impl GroupRepo {
    pub async fn create(pool: &Pool<Sqlite>, req: &CreateGroupRequest) -> Result<Group> {
        let res = sqlx::query(
            "INSERT INTO groups (name, description, created_at, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        )
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .execute(pool)
        .await?;

        let id = res.last_insert_rowid();
        Self::get(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("group vanished after insert: {}", id))
    }

    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Group>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.name, g.description, g.created_at, g.updated_at,
                   (SELECT COUNT(*) FROM device_group_members m WHERE m.group_id = g.id) AS device_count
            FROM groups g
            ORDER BY g.id
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_group_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Group>> {
        let row = sqlx::query(
            r#"
            SELECT g.id, g.name, g.description, g.created_at, g.updated_at,
                   (SELECT COUNT(*) FROM device_group_members m WHERE m.group_id = g.id) AS device_count
            FROM groups g
            WHERE g.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_group_row))
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        req: &CreateGroupRequest,
    ) -> Result<Option<Group>> {
        let res = sqlx::query(
            "UPDATE groups SET name = ?, description = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(id)
        .execute(pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get(pool, id).await
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
        let mut tx = pool.begin().await?;

        for table in [
            "device_group_members",
            "group_variables",
            "group_template_assignments",
            "group_prefixes",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE group_id = ?", table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let res = sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn add_member(pool: &Pool<Sqlite>, group_id: i64, device_uuid: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO device_group_members (device_uuid, group_id) VALUES (?, ?)",
        )
        .bind(device_uuid)
        .bind(group_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn remove_member(
        pool: &Pool<Sqlite>,
        group_id: i64,
        device_uuid: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM device_group_members WHERE group_id = ? AND device_uuid = ?")
            .bind(group_id)
            .bind(device_uuid)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn members(pool: &Pool<Sqlite>, group_id: i64) -> Result<Vec<Device>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.uuid, d.device_key, d.name, d.backend, d.mac, d.status,
                   d.last_config_sha, d.last_error, d.last_seen, d.created_at, d.updated_at
            FROM devices d
            JOIN device_group_members m ON m.device_uuid = d.uuid
            WHERE m.group_id = ?
            ORDER BY d.name, d.uuid
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_device_row).collect())
    }

    /// Group IDs a device belongs to, ascending. Merge order for group
    /// variables and templates follows this ordering.
    pub async fn device_group_ids(pool: &Pool<Sqlite>, device_uuid: &str) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT group_id FROM device_group_members WHERE device_uuid = ? ORDER BY group_id",
        )
        .bind(device_uuid)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
