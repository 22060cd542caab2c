use anyhow::Result;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use super::row_helpers::map_prefix_row;
use crate::models::{DeviceAddress, Prefix, family};
use crate::utils::{format_cidr, looks_ipv6, parse_cidr, parse_ipv4_to_u32, u32_to_ipv4};

/// Typed IPAM failures, downcast by the API layer for status mapping.
#[derive(Debug)]
pub enum IpamError {
    InvalidPrefixLength { parent: String, requested: u8 },
    Exhausted { parent: String, requested: u8 },
    UnsupportedFamily { cidr: String },
    NoFreeAddress { prefix: String },
}

impl std::fmt::Display for IpamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpamError::InvalidPrefixLength { parent, requested } => {
                write!(f, "cannot carve a /{} out of {}", requested, parent)
            }
            IpamError::Exhausted { parent, requested } => {
                write!(f, "no free /{} left in {}", requested, parent)
            }
            IpamError::UnsupportedFamily { cidr } => {
                write!(f, "unsupported address family: {}", cidr)
            }
            IpamError::NoFreeAddress { prefix } => {
                write!(f, "no free address in {}", prefix)
            }
        }
    }
}

impl std::error::Error for IpamError {}

fn map_address_row(row: &SqliteRow) -> DeviceAddress {
    DeviceAddress {
        id: row.get("id"),
        device_uuid: row.get("device_uuid"),
        prefix_id: row.get("prefix_id"),
        address: row.get("address"),
        created_at: row.get("created_at"),
    }
}

const PREFIX_COLS: &str = "id, cidr, parent_id, family, note, created_at";

pub struct IpamRepo;

impl IpamRepo {
    pub async fn create_root_prefix(
        pool: &Pool<Sqlite>,
        cidr: &str,
        note: &str,
    ) -> Result<Prefix> {
        if looks_ipv6(cidr) {
            return Err(IpamError::UnsupportedFamily {
                cidr: cidr.to_string(),
            }
            .into());
        }
        let (network, _, len) = parse_cidr(cidr).map_err(|e| anyhow::anyhow!(e))?;
        let canonical = format_cidr(network, len);

        let res = sqlx::query(
            "INSERT INTO ipam_prefixes (cidr, parent_id, family, note) VALUES (?, NULL, ?, ?)",
        )
        .bind(&canonical)
        .bind(family::IPV4)
        .bind(note)
        .execute(pool)
        .await?;

        let id = res.last_insert_rowid();
        Self::get(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("prefix vanished after insert: {}", id))
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Prefix>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ipam_prefixes WHERE id = ?",
            PREFIX_COLS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_prefix_row))
    }

    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Prefix>> {
        let rows = sqlx::query(&format!("SELECT {} FROM ipam_prefixes ORDER BY id", PREFIX_COLS))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_prefix_row).collect())
    }

    pub async fn children(pool: &Pool<Sqlite>, parent_id: i64) -> Result<Vec<Prefix>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ipam_prefixes WHERE parent_id = ? ORDER BY id",
            PREFIX_COLS
        ))
        .bind(parent_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_prefix_row).collect())
    }

    /// Carve the lowest free child of the requested length out of a parent
    /// prefix. The occupancy scan and the insert run in one transaction so
    /// two concurrent calls cannot pick the same block.
    pub async fn allocate_child(
        pool: &Pool<Sqlite>,
        parent_id: i64,
        prefix_length: u8,
        note: &str,
    ) -> Result<Prefix> {
        let mut tx = pool.begin().await?;

        let parent_row = sqlx::query(&format!(
            "SELECT {} FROM ipam_prefixes WHERE id = ?",
            PREFIX_COLS
        ))
        .bind(parent_id)
        .fetch_optional(&mut *tx)
        .await?;
        let parent = parent_row
            .as_ref()
            .map(map_prefix_row)
            .ok_or_else(|| super::NotFoundError::new("prefix", &parent_id.to_string()))?;

        if parent.family != family::IPV4 {
            return Err(IpamError::UnsupportedFamily { cidr: parent.cidr }.into());
        }
        let (parent_net, parent_bcast, parent_len) =
            parse_cidr(&parent.cidr).map_err(|e| anyhow::anyhow!(e))?;
        if prefix_length <= parent_len || prefix_length > 32 {
            return Err(IpamError::InvalidPrefixLength {
                parent: parent.cidr,
                requested: prefix_length,
            }
            .into());
        }

        let sibling_rows: Vec<(String,)> =
            sqlx::query_as("SELECT cidr FROM ipam_prefixes WHERE parent_id = ?")
                .bind(parent_id)
                .fetch_all(&mut *tx)
                .await?;
        let mut occupied: Vec<(u32, u32)> = Vec::with_capacity(sibling_rows.len());
        for (cidr,) in &sibling_rows {
            let (net, bcast, _) = parse_cidr(cidr).map_err(|e| anyhow::anyhow!(e))?;
            occupied.push((net, bcast));
        }

        let step: u64 = 1u64 << (32 - prefix_length as u32);
        let mut candidate = parent_net as u64;
        let mut chosen: Option<u32> = None;
        while candidate + step - 1 <= parent_bcast as u64 {
            let net = candidate as u32;
            let bcast = (candidate + step - 1) as u32;
            if !occupied.iter().any(|&(o_net, o_bcast)| net <= o_bcast && o_net <= bcast) {
                chosen = Some(net);
                break;
            }
            candidate += step;
        }
        let net = chosen.ok_or(IpamError::Exhausted {
            parent: format_cidr(parent_net, parent_len),
            requested: prefix_length,
        })?;

        let child_cidr = format_cidr(net, prefix_length);
        let res = sqlx::query(
            "INSERT INTO ipam_prefixes (cidr, parent_id, family, note) VALUES (?, ?, ?, ?)",
        )
        .bind(&child_cidr)
        .bind(parent_id)
        .bind(family::IPV4)
        .bind(note)
        .execute(&mut *tx)
        .await?;
        let id = res.last_insert_rowid();

        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("prefix vanished after insert: {}", id))
    }

    pub async fn delete_prefix(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
        let child_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ipam_prefixes WHERE parent_id = ?")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if child_count.0 > 0 {
            anyhow::bail!("prefix {} still has child prefixes", id);
        }

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM device_addresses WHERE prefix_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM group_prefixes WHERE prefix_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM ipam_prefixes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn assign_to_group(
        pool: &Pool<Sqlite>,
        group_id: i64,
        prefix_id: i64,
    ) -> Result<()> {
        // One binding per group, and a prefix is never rebound.
        sqlx::query("INSERT INTO group_prefixes (group_id, prefix_id) VALUES (?, ?)")
            .bind(group_id)
            .bind(prefix_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn group_prefix(pool: &Pool<Sqlite>, group_id: i64) -> Result<Option<Prefix>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.cidr, p.parent_id, p.family, p.note, p.created_at
            FROM ipam_prefixes p
            JOIN group_prefixes gp ON gp.prefix_id = p.id
            WHERE gp.group_id = ?
            "#,
        )
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_prefix_row))
    }

    /// The prefix of the first listed group that has one bound.
    pub async fn first_group_prefix(
        pool: &Pool<Sqlite>,
        group_ids: &[i64],
    ) -> Result<Option<Prefix>> {
        for gid in group_ids {
            if let Some(p) = Self::group_prefix(pool, *gid).await? {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    /// Lease the lowest free host address in a prefix to a device.
    /// Network, network+1 (gateway) and broadcast are reserved. Repeated
    /// calls for the same device return its existing lease.
    pub async fn assign_address(
        pool: &Pool<Sqlite>,
        prefix_id: i64,
        device_uuid: &str,
    ) -> Result<DeviceAddress> {
        let mut tx = pool.begin().await?;

        let prefix_row = sqlx::query(&format!(
            "SELECT {} FROM ipam_prefixes WHERE id = ?",
            PREFIX_COLS
        ))
        .bind(prefix_id)
        .fetch_optional(&mut *tx)
        .await?;
        let prefix = prefix_row
            .as_ref()
            .map(map_prefix_row)
            .ok_or_else(|| super::NotFoundError::new("prefix", &prefix_id.to_string()))?;

        if prefix.family != family::IPV4 {
            return Err(IpamError::UnsupportedFamily { cidr: prefix.cidr }.into());
        }
        let (network, broadcast, _) = parse_cidr(&prefix.cidr).map_err(|e| anyhow::anyhow!(e))?;

        let existing = sqlx::query(
            "SELECT id, device_uuid, prefix_id, address, created_at FROM device_addresses WHERE prefix_id = ? AND device_uuid = ?",
        )
        .bind(prefix_id)
        .bind(device_uuid)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(map_address_row(&row));
        }

        let taken_rows: Vec<(String,)> =
            sqlx::query_as("SELECT address FROM device_addresses WHERE prefix_id = ?")
                .bind(prefix_id)
                .fetch_all(&mut *tx)
                .await?;
        let mut taken: Vec<u32> = Vec::with_capacity(taken_rows.len());
        for (addr,) in &taken_rows {
            taken.push(parse_ipv4_to_u32(addr).map_err(|e| anyhow::anyhow!(e))?);
        }

        // First usable host is network+2, the gateway owns network+1.
        let mut chosen: Option<u32> = None;
        let mut host = network as u64 + 2;
        while host < broadcast as u64 {
            let h = host as u32;
            if !taken.contains(&h) {
                chosen = Some(h);
                break;
            }
            host += 1;
        }
        let address = chosen.ok_or(IpamError::NoFreeAddress { prefix: prefix.cidr })?;
        let address_str = u32_to_ipv4(address);

        let res = sqlx::query(
            "INSERT INTO device_addresses (device_uuid, prefix_id, address) VALUES (?, ?, ?)",
        )
        .bind(device_uuid)
        .bind(prefix_id)
        .bind(&address_str)
        .execute(&mut *tx)
        .await?;
        let id = res.last_insert_rowid();

        tx.commit().await?;

        let row = sqlx::query(
            "SELECT id, device_uuid, prefix_id, address, created_at FROM device_addresses WHERE id = ?",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(map_address_row(&row))
    }

    pub async fn device_addresses(
        pool: &Pool<Sqlite>,
        device_uuid: &str,
    ) -> Result<Vec<DeviceAddress>> {
        let rows = sqlx::query(
            "SELECT id, device_uuid, prefix_id, address, created_at FROM device_addresses WHERE device_uuid = ? ORDER BY id",
        )
        .bind(device_uuid)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_address_row).collect())
    }

    /// A lease is released by deleting its record.
    pub async fn release_address(pool: &Pool<Sqlite>, lease_id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM device_addresses WHERE id = ?")
            .bind(lease_id)
            .execute(pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn prefix_addresses(
        pool: &Pool<Sqlite>,
        prefix_id: i64,
    ) -> Result<Vec<DeviceAddress>> {
        let rows = sqlx::query(
            "SELECT id, device_uuid, prefix_id, address, created_at FROM device_addresses WHERE prefix_id = ? ORDER BY id",
        )
        .bind(prefix_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_address_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    async fn test_store() -> Store {
        // A single connection keeps the in-memory DB alive and shared.
        Store::with_pool_size(":memory:", 1)
            .await
            .expect("in-memory store")
    }

    #[tokio::test]
    async fn allocates_consecutive_children() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.0.0/16", "")
            .await
            .unwrap();

        let a = IpamRepo::allocate_child(store.pool(), root.id, 24, "").await.unwrap();
        let b = IpamRepo::allocate_child(store.pool(), root.id, 24, "").await.unwrap();
        assert_eq!(a.cidr, "10.0.0.0/24");
        assert_eq!(b.cidr, "10.0.1.0/24");
        assert_eq!(b.parent_id, Some(root.id));
    }

    #[tokio::test]
    async fn skips_occupied_blocks_of_other_sizes() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.0.0/16", "")
            .await
            .unwrap();

        let big = IpamRepo::allocate_child(store.pool(), root.id, 23, "").await.unwrap();
        assert_eq!(big.cidr, "10.0.0.0/23");
        // A /24 must land past the /23 it would otherwise overlap.
        let small = IpamRepo::allocate_child(store.pool(), root.id, 24, "").await.unwrap();
        assert_eq!(small.cidr, "10.0.2.0/24");
    }

    #[tokio::test]
    async fn rejects_bad_child_length() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.0.0/24", "")
            .await
            .unwrap();

        let err = IpamRepo::allocate_child(store.pool(), root.id, 24, "")
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<IpamError>().is_some());
    }

    #[tokio::test]
    async fn exhausts_parent() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.0.0/30", "")
            .await
            .unwrap();

        IpamRepo::allocate_child(store.pool(), root.id, 31, "").await.unwrap();
        IpamRepo::allocate_child(store.pool(), root.id, 31, "").await.unwrap();
        let err = IpamRepo::allocate_child(store.pool(), root.id, 31, "")
            .await
            .unwrap_err();
        match err.downcast_ref::<IpamError>() {
            Some(IpamError::Exhausted { .. }) => {}
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn leases_start_past_gateway_and_are_idempotent() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.1.0/24", "")
            .await
            .unwrap();

        let first = IpamRepo::assign_address(store.pool(), root.id, "dev-a").await.unwrap();
        assert_eq!(first.address, "10.0.1.2");

        let second = IpamRepo::assign_address(store.pool(), root.id, "dev-b").await.unwrap();
        assert_eq!(second.address, "10.0.1.3");

        // Same device asks again: same lease, no new row.
        let again = IpamRepo::assign_address(store.pool(), root.id, "dev-a").await.unwrap();
        assert_eq!(again.address, "10.0.1.2");
        assert_eq!(again.id, first.id);

        let all = IpamRepo::prefix_addresses(store.pool(), root.id).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn released_addresses_are_reused() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.1.0/29", "")
            .await
            .unwrap();

        let a = IpamRepo::assign_address(store.pool(), root.id, "dev-a").await.unwrap();
        IpamRepo::assign_address(store.pool(), root.id, "dev-b").await.unwrap();
        assert!(IpamRepo::release_address(store.pool(), a.id).await.unwrap());
        // deleting the same lease twice is a no-op
        assert!(!IpamRepo::release_address(store.pool(), a.id).await.unwrap());

        let c = IpamRepo::assign_address(store.pool(), root.id, "dev-c").await.unwrap();
        assert_eq!(c.address, a.address);
    }

    #[tokio::test]
    async fn rejects_ipv6() {
        let store = test_store().await;
        let err = IpamRepo::create_root_prefix(store.pool(), "fd00::/48", "")
            .await
            .unwrap_err();
        match err.downcast_ref::<IpamError>() {
            Some(IpamError::UnsupportedFamily { .. }) => {}
            other => panic!("expected UnsupportedFamily, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn group_prefix_binding() {
        let store = test_store().await;
        let root = IpamRepo::create_root_prefix(store.pool(), "10.0.0.0/16", "")
            .await
            .unwrap();
        let child = IpamRepo::allocate_child(store.pool(), root.id, 24, "lab").await.unwrap();

        IpamRepo::assign_to_group(store.pool(), 7, child.id).await.unwrap();
        let bound = IpamRepo::group_prefix(store.pool(), 7).await.unwrap().unwrap();
        assert_eq!(bound.id, child.id);

        let first = IpamRepo::first_group_prefix(store.pool(), &[3, 7, 9])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, child.id);
        assert!(IpamRepo::first_group_prefix(store.pool(), &[3, 9])
            .await
            .unwrap()
            .is_none());
    }
}
