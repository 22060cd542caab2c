use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use super::row_helpers::{map_device_row, none_if_empty};
use crate::models::{Device, DeviceStatusRecord, RegisterFields};

fn map_status_row(row: &SqliteRow) -> DeviceStatusRecord {
    DeviceStatusRecord {
        id: row.get("id"),
        device_uuid: row.get("device_uuid"),
        status: row.get("status"),
        config_sha: row.get("config_sha"),
        error: none_if_empty(row.get("error")),
        created_at: row.get("created_at"),
    }
}

const DEVICE_COLS: &str =
    "id, uuid, device_key, name, backend, mac, status, last_config_sha, last_error, last_seen, created_at, updated_at";

pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Device>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM devices ORDER BY name, uuid",
            DEVICE_COLS
        ))
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_device_row).collect())
    }

    pub async fn get_by_uuid(pool: &Pool<Sqlite>, uuid: &str) -> Result<Option<Device>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM devices WHERE uuid = ?",
            DEVICE_COLS
        ))
        .bind(uuid)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_device_row))
    }

    pub async fn get_by_key(pool: &Pool<Sqlite>, device_key: &str) -> Result<Option<Device>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM devices WHERE device_key = ? ORDER BY id LIMIT 1",
            DEVICE_COLS
        ))
        .bind(device_key)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_device_row))
    }

    /// Register a device by its shared key. Returns the device and whether
    /// this call created it (first contact) or refreshed an existing row.
    pub async fn upsert_by_key(
        pool: &Pool<Sqlite>,
        device_key: &str,
        fields: &RegisterFields,
    ) -> Result<(Device, bool)> {
        if let Some(existing) = Self::get_by_key(pool, device_key).await? {
            sqlx::query(
                r#"
                UPDATE devices
                SET name = CASE WHEN ? != '' THEN ? ELSE name END,
                    backend = CASE WHEN ? != '' THEN ? ELSE backend END,
                    mac = CASE WHEN ? != '' THEN ? ELSE mac END,
                    last_seen = CURRENT_TIMESTAMP,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&fields.name)
            .bind(&fields.name)
            .bind(&fields.backend)
            .bind(&fields.backend)
            .bind(&fields.mac)
            .bind(&fields.mac)
            .bind(existing.id)
            .execute(pool)
            .await?;

            let device = Self::get_by_uuid(pool, &existing.uuid)
                .await?
                .unwrap_or(existing);
            return Ok((device, false));
        }

        let uuid = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO devices (uuid, device_key, name, backend, mac, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, '', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(&uuid)
        .bind(device_key)
        .bind(&fields.name)
        .bind(&fields.backend)
        .bind(&fields.mac)
        .execute(pool)
        .await?;

        let device = Self::get_by_uuid(pool, &uuid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("device vanished after insert: {}", uuid))?;
        Ok((device, true))
    }

    pub async fn touch_seen(pool: &Pool<Sqlite>, uuid: &str) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen = CURRENT_TIMESTAMP WHERE uuid = ?")
            .bind(uuid)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_config_sha(pool: &Pool<Sqlite>, uuid: &str, sha: &str) -> Result<()> {
        sqlx::query(
            "UPDATE devices SET last_config_sha = ?, updated_at = CURRENT_TIMESTAMP WHERE uuid = ?",
        )
        .bind(sha)
        .bind(uuid)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a reported status: updates the device row and appends an
    /// audit-trail entry inside one transaction.
    pub async fn record_status(
        pool: &Pool<Sqlite>,
        uuid: &str,
        status: &str,
        config_sha: &str,
        error: &str,
    ) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE devices
            SET status = ?, last_error = ?, last_seen = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE uuid = ?
            "#,
        )
        .bind(status)
        .bind(error)
        .bind(uuid)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO device_status_history (device_uuid, status, config_sha, error) VALUES (?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(status)
        .bind(config_sha)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn status_history(
        pool: &Pool<Sqlite>,
        uuid: &str,
        limit: i32,
    ) -> Result<Vec<DeviceStatusRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, device_uuid, status, config_sha, error, created_at
            FROM device_status_history
            WHERE device_uuid = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(uuid)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_status_row).collect())
    }

    /// Delete a device and everything hanging off it.
    pub async fn delete(pool: &Pool<Sqlite>, uuid: &str) -> Result<()> {
        let mut tx = pool.begin().await?;

        for table in [
            "device_template_assignments",
            "device_template_blocks",
            "device_group_members",
            "device_variables",
            "device_addresses",
            "device_status_history",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE device_uuid = ?", table))
                .bind(uuid)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM devices WHERE uuid = ?")
            .bind(uuid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
