use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::models::{DeviceVariable, GlobalVariable, GroupVariable};

fn map_device_var_row(row: &SqliteRow) -> DeviceVariable {
    DeviceVariable {
        id: row.get("id"),
        device_uuid: row.get("device_uuid"),
        key: row.get("key"),
        value: row.get("value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_group_var_row(row: &SqliteRow) -> GroupVariable {
    GroupVariable {
        id: row.get("id"),
        group_id: row.get("group_id"),
        key: row.get("key"),
        value: row.get("value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn map_global_var_row(row: &SqliteRow) -> GlobalVariable {
    GlobalVariable {
        id: row.get("id"),
        key: row.get("key"),
        value: row.get("value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct DeviceVariableRepo;

impl DeviceVariableRepo {
    pub async fn list_by_device(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
    ) -> Result<Vec<DeviceVariable>> {
        let rows = sqlx::query(
            "SELECT id, device_uuid, key, value, created_at, updated_at FROM device_variables WHERE device_uuid = ? ORDER BY key",
        )
        .bind(device_uuid)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_device_var_row).collect())
    }

    pub async fn set(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_variables (device_uuid, key, value, created_at, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(device_uuid, key)
            DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(device_uuid)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, device_uuid: &str, key: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM device_variables WHERE device_uuid = ? AND key = ?")
            .bind(device_uuid)
            .bind(key)
            .execute(pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

pub struct GroupVariableRepo;

impl GroupVariableRepo {
    pub async fn list_by_group(pool: &Pool<Sqlite>, group_id: i64) -> Result<Vec<GroupVariable>> {
        let rows = sqlx::query(
            "SELECT id, group_id, key, value, created_at, updated_at FROM group_variables WHERE group_id = ? ORDER BY key",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_group_var_row).collect())
    }

    pub async fn set(pool: &Pool<Sqlite>, group_id: i64, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_variables (group_id, key, value, created_at, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(group_id, key)
            DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(group_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, group_id: i64, key: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM group_variables WHERE group_id = ? AND key = ?")
            .bind(group_id)
            .bind(key)
            .execute(pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

pub struct GlobalVariableRepo;

impl GlobalVariableRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<GlobalVariable>> {
        let rows = sqlx::query(
            "SELECT id, key, value, created_at, updated_at FROM global_variables ORDER BY key",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_global_var_row).collect())
    }

    pub async fn set(pool: &Pool<Sqlite>, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_variables (key, value, created_at, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(key)
            DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, key: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM global_variables WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
