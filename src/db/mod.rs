mod devices;
mod groups;
mod ipam;
pub(crate) mod row_helpers;
mod templates;
mod variables;

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};

use crate::models::*;

pub use ipam::IpamError;

use devices::DeviceRepo;
use groups::GroupRepo;
use ipam::IpamRepo;
use templates::TemplateRepo;
use variables::{DeviceVariableRepo, GlobalVariableRepo, GroupVariableRepo};

/// Typed error for "resource not found" — enables reliable downcast
/// in the API error handler instead of fragile string matching.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // ===== Devices =====

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        DeviceRepo::list(&self.pool).await
    }

    pub async fn get_device(&self, uuid: &str) -> Result<Option<Device>> {
        DeviceRepo::get_by_uuid(&self.pool, uuid).await
    }

    pub async fn register_device(
        &self,
        device_key: &str,
        fields: &RegisterFields,
    ) -> Result<(Device, bool)> {
        DeviceRepo::upsert_by_key(&self.pool, device_key, fields).await
    }

    pub async fn touch_device_seen(&self, uuid: &str) -> Result<()> {
        DeviceRepo::touch_seen(&self.pool, uuid).await
    }

    pub async fn update_device_config_sha(&self, uuid: &str, sha: &str) -> Result<()> {
        DeviceRepo::update_config_sha(&self.pool, uuid, sha).await
    }

    pub async fn record_device_status(
        &self,
        uuid: &str,
        status: &str,
        config_sha: &str,
        error: &str,
    ) -> Result<()> {
        DeviceRepo::record_status(&self.pool, uuid, status, config_sha, error).await
    }

    pub async fn device_status_history(
        &self,
        uuid: &str,
        limit: i32,
    ) -> Result<Vec<DeviceStatusRecord>> {
        DeviceRepo::status_history(&self.pool, uuid, limit).await
    }

    pub async fn delete_device(&self, uuid: &str) -> Result<()> {
        DeviceRepo::delete(&self.pool, uuid).await
    }

    // ===== Templates =====

    pub async fn create_template(&self, req: &CreateTemplateRequest) -> Result<Template> {
        TemplateRepo::create(&self.pool, req).await
    }

    pub async fn list_templates(&self) -> Result<Vec<Template>> {
        TemplateRepo::list(&self.pool).await
    }

    pub async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        TemplateRepo::get(&self.pool, id).await
    }

    pub async fn update_template(
        &self,
        id: i64,
        req: &CreateTemplateRequest,
    ) -> Result<Option<Template>> {
        TemplateRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_template(&self, id: i64) -> Result<bool> {
        TemplateRepo::delete(&self.pool, id).await
    }

    pub async fn list_required_templates(&self) -> Result<Vec<Template>> {
        TemplateRepo::list_required(&self.pool).await
    }

    pub async fn list_default_templates(&self) -> Result<Vec<Template>> {
        TemplateRepo::list_default(&self.pool).await
    }

    pub async fn device_template_assignments(
        &self,
        device_uuid: &str,
    ) -> Result<Vec<TemplateAssignment>> {
        TemplateRepo::device_assignments(&self.pool, device_uuid).await
    }

    pub async fn group_template_assignments(
        &self,
        group_id: i64,
    ) -> Result<Vec<TemplateAssignment>> {
        TemplateRepo::group_assignments(&self.pool, group_id).await
    }

    pub async fn group_template_assignments_for_groups(
        &self,
        group_ids: &[i64],
    ) -> Result<Vec<TemplateAssignment>> {
        TemplateRepo::group_assignments_for_groups(&self.pool, group_ids).await
    }

    pub async fn assign_template_to_device(
        &self,
        device_uuid: &str,
        template_id: i64,
        enabled: bool,
        sort_order: i32,
    ) -> Result<()> {
        TemplateRepo::assign_to_device(&self.pool, device_uuid, template_id, enabled, sort_order)
            .await
    }

    pub async fn unassign_template_from_device(
        &self,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        TemplateRepo::unassign_from_device(&self.pool, device_uuid, template_id).await
    }

    pub async fn assign_template_to_group(
        &self,
        group_id: i64,
        template_id: i64,
        enabled: bool,
        sort_order: i32,
    ) -> Result<()> {
        TemplateRepo::assign_to_group(&self.pool, group_id, template_id, enabled, sort_order).await
    }

    pub async fn unassign_template_from_group(
        &self,
        group_id: i64,
        template_id: i64,
    ) -> Result<()> {
        TemplateRepo::unassign_from_group(&self.pool, group_id, template_id).await
    }

    pub async fn device_template_blocks(&self, device_uuid: &str) -> Result<Vec<i64>> {
        TemplateRepo::device_blocks(&self.pool, device_uuid).await
    }

    pub async fn block_template_for_device(
        &self,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        TemplateRepo::block_for_device(&self.pool, device_uuid, template_id).await
    }

    pub async fn unblock_template_for_device(
        &self,
        device_uuid: &str,
        template_id: i64,
    ) -> Result<()> {
        TemplateRepo::unblock_for_device(&self.pool, device_uuid, template_id).await
    }

    pub async fn templates_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Template>> {
        TemplateRepo::by_ids(&self.pool, ids).await
    }

    pub async fn reorder_device_templates(
        &self,
        device_uuid: &str,
        items: &[ReorderItem],
    ) -> Result<()> {
        TemplateRepo::reorder_device(&self.pool, device_uuid, items).await
    }

    // ===== Groups =====

    pub async fn create_group(&self, req: &CreateGroupRequest) -> Result<Group> {
        GroupRepo::create(&self.pool, req).await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        GroupRepo::list(&self.pool).await
    }

    pub async fn get_group(&self, id: i64) -> Result<Option<Group>> {
        GroupRepo::get(&self.pool, id).await
    }

    pub async fn update_group(&self, id: i64, req: &CreateGroupRequest) -> Result<Option<Group>> {
        GroupRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_group(&self, id: i64) -> Result<bool> {
        GroupRepo::delete(&self.pool, id).await
    }

    pub async fn add_group_member(&self, group_id: i64, device_uuid: &str) -> Result<()> {
        GroupRepo::add_member(&self.pool, group_id, device_uuid).await
    }

    pub async fn remove_group_member(&self, group_id: i64, device_uuid: &str) -> Result<()> {
        GroupRepo::remove_member(&self.pool, group_id, device_uuid).await
    }

    pub async fn group_members(&self, group_id: i64) -> Result<Vec<Device>> {
        GroupRepo::members(&self.pool, group_id).await
    }

    pub async fn device_group_ids(&self, device_uuid: &str) -> Result<Vec<i64>> {
        GroupRepo::device_group_ids(&self.pool, device_uuid).await
    }

    // ===== Variables =====

    pub async fn list_device_variables(&self, device_uuid: &str) -> Result<Vec<DeviceVariable>> {
        DeviceVariableRepo::list_by_device(&self.pool, device_uuid).await
    }

    pub async fn set_device_variable(
        &self,
        device_uuid: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        DeviceVariableRepo::set(&self.pool, device_uuid, key, value).await
    }

    pub async fn delete_device_variable(&self, device_uuid: &str, key: &str) -> Result<bool> {
        DeviceVariableRepo::delete(&self.pool, device_uuid, key).await
    }

    pub async fn list_group_variables(&self, group_id: i64) -> Result<Vec<GroupVariable>> {
        GroupVariableRepo::list_by_group(&self.pool, group_id).await
    }

    pub async fn set_group_variable(&self, group_id: i64, key: &str, value: &str) -> Result<()> {
        GroupVariableRepo::set(&self.pool, group_id, key, value).await
    }

    pub async fn delete_group_variable(&self, group_id: i64, key: &str) -> Result<bool> {
        GroupVariableRepo::delete(&self.pool, group_id, key).await
    }

    pub async fn list_global_variables(&self) -> Result<Vec<GlobalVariable>> {
        GlobalVariableRepo::list(&self.pool).await
    }

    pub async fn set_global_variable(&self, key: &str, value: &str) -> Result<()> {
        GlobalVariableRepo::set(&self.pool, key, value).await
    }

    pub async fn delete_global_variable(&self, key: &str) -> Result<bool> {
        GlobalVariableRepo::delete(&self.pool, key).await
    }

    // ===== IPAM =====

    pub async fn create_root_prefix(&self, cidr: &str, note: &str) -> Result<Prefix> {
        IpamRepo::create_root_prefix(&self.pool, cidr, note).await
    }

    pub async fn get_prefix(&self, id: i64) -> Result<Option<Prefix>> {
        IpamRepo::get(&self.pool, id).await
    }

    pub async fn list_prefixes(&self) -> Result<Vec<Prefix>> {
        IpamRepo::list(&self.pool).await
    }

    pub async fn prefix_children(&self, parent_id: i64) -> Result<Vec<Prefix>> {
        IpamRepo::children(&self.pool, parent_id).await
    }

    pub async fn allocate_child_prefix(
        &self,
        parent_id: i64,
        prefix_length: u8,
        note: &str,
    ) -> Result<Prefix> {
        IpamRepo::allocate_child(&self.pool, parent_id, prefix_length, note).await
    }

    pub async fn delete_prefix(&self, id: i64) -> Result<bool> {
        IpamRepo::delete_prefix(&self.pool, id).await
    }

    pub async fn assign_prefix_to_group(&self, group_id: i64, prefix_id: i64) -> Result<()> {
        IpamRepo::assign_to_group(&self.pool, group_id, prefix_id).await
    }

    pub async fn group_prefix(&self, group_id: i64) -> Result<Option<Prefix>> {
        IpamRepo::group_prefix(&self.pool, group_id).await
    }

    pub async fn first_group_prefix(&self, group_ids: &[i64]) -> Result<Option<Prefix>> {
        IpamRepo::first_group_prefix(&self.pool, group_ids).await
    }

    pub async fn assign_address(&self, prefix_id: i64, device_uuid: &str) -> Result<DeviceAddress> {
        IpamRepo::assign_address(&self.pool, prefix_id, device_uuid).await
    }

    pub async fn device_addresses(&self, device_uuid: &str) -> Result<Vec<DeviceAddress>> {
        IpamRepo::device_addresses(&self.pool, device_uuid).await
    }

    pub async fn release_address(&self, lease_id: i64) -> Result<bool> {
        IpamRepo::release_address(&self.pool, lease_id).await
    }

    pub async fn prefix_addresses(&self, prefix_id: i64) -> Result<Vec<DeviceAddress>> {
        IpamRepo::prefix_addresses(&self.pool, prefix_id).await
    }
}
