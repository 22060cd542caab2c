//! Config build pipeline: resolve variables and templates for a device,
//! render to a path -> content map, and package as a reproducible archive.

pub mod archive;
pub mod renderer;
pub mod resolver;
pub mod varschema;

use std::collections::BTreeMap;

use anyhow::Result;

use crate::db::Store;
use crate::models::Device;
use renderer::Renderer;

pub struct ConfigBuilder {
    store: Store,
    renderer: Renderer,
}

impl ConfigBuilder {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            renderer: Renderer::new(),
        }
    }

    pub fn with_renderer(store: Store, renderer: Renderer) -> Self {
        Self { store, renderer }
    }

    /// Produce the device's file set. Templates render in resolution order,
    /// a later template overwrites an earlier one on the same path.
    pub async fn build_files(&self, device: &Device) -> Result<BTreeMap<String, String>> {
        let resolved = resolver::resolve_variables(&self.store, device).await?;
        let templates = resolver::resolve_templates(&self.store, &device.uuid).await?;

        let mut files: BTreeMap<String, String> = BTreeMap::new();
        for template in &templates {
            for (path, content) in self.renderer.render_one(template, &resolved.vars)? {
                files.insert(path, content);
            }
        }

        if files.is_empty() {
            let hostname = resolved
                .vars
                .get("hostname")
                .cloned()
                .unwrap_or_else(|| device.name.clone());
            files.insert(
                "etc/config/system".to_string(),
                format!(
                    "config system 'system'\n  option hostname '{}'\n  option timezone 'UTC'\n",
                    hostname.replace('\'', "")
                ),
            );
        }

        files.insert(
            "etc/roost/device.meta".to_string(),
            format!(
                "uuid={}\nmac={}\nbackend={}\n",
                device.uuid, device.mac, device.backend
            ),
        );

        Ok(files)
    }

    /// Build the archive and its sha256 hex for a device.
    pub async fn build_archive(&self, device: &Device) -> Result<(Vec<u8>, String)> {
        let files = self.build_files(device).await?;
        archive::build(&files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateGroupRequest, CreateTemplateRequest, RegisterFields};

    async fn test_store() -> Store {
        Store::with_pool_size(":memory:", 1).await.expect("store")
    }

    async fn register(store: &Store, name: &str) -> Device {
        let fields = RegisterFields {
            name: name.to_string(),
            backend: "openwrt".to_string(),
            mac: "00:11:22:33:44:55".to_string(),
        };
        let (device, _) = store.register_device("key-1", &fields).await.unwrap();
        device
    }

    #[tokio::test]
    async fn zero_templates_yield_fallback_and_meta() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        let builder = ConfigBuilder::new(store);
        let files = builder.build_files(&device).await.unwrap();

        assert_eq!(files.len(), 2);
        assert!(files["etc/config/system"].contains("option hostname 'ap-1'"));
        let meta = &files["etc/roost/device.meta"];
        assert!(meta.contains(&format!("uuid={}", device.uuid)));
        assert!(meta.contains("backend=openwrt"));
    }

    #[tokio::test]
    async fn hostname_override_flows_into_rendered_file() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        store
            .create_template(&CreateTemplateRequest {
                name: "system".to_string(),
                path: "/etc/config/system".to_string(),
                body: "config system 'system'\n  option hostname '{{ vars.hostname }}'\n"
                    .to_string(),
                kind: "go".to_string(),
                required: true,
                is_default: false,
            })
            .await
            .unwrap();
        store
            .set_device_variable(&device.uuid, "hostname", "edge-router-7")
            .await
            .unwrap();

        let builder = ConfigBuilder::new(store);
        let files = builder.build_files(&device).await.unwrap();
        assert!(files["etc/config/system"].contains("option hostname 'edge-router-7'"));
    }

    #[tokio::test]
    async fn later_template_wins_on_same_path() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        let base = store
            .create_template(&CreateTemplateRequest {
                name: "base".to_string(),
                path: "etc/config/firewall".to_string(),
                body: "from-base\n".to_string(),
                kind: "go".to_string(),
                required: false,
                is_default: true,
            })
            .await
            .unwrap();
        let over = store
            .create_template(&CreateTemplateRequest {
                name: "override".to_string(),
                path: "etc/config/firewall".to_string(),
                body: "from-device\n".to_string(),
                kind: "go".to_string(),
                required: false,
                is_default: false,
            })
            .await
            .unwrap();
        store
            .assign_template_to_device(&device.uuid, over.id, true, 100)
            .await
            .unwrap();

        let builder = ConfigBuilder::new(store);
        let files = builder.build_files(&device).await.unwrap();
        assert_eq!(files["etc/config/firewall"], "from-device\n");
        let _ = base;
    }

    #[tokio::test]
    async fn build_failure_produces_no_partial_output() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        // wan_proto missing: the resolver must abort before any rendering
        let builder = ConfigBuilder::new(store);
        assert!(builder.build_files(&device).await.is_err());
    }

    #[tokio::test]
    async fn archive_is_byte_stable_across_builds() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        let builder = ConfigBuilder::new(store);
        let (bytes_a, sha_a) = builder.build_archive(&device).await.unwrap();
        let (bytes_b, sha_b) = builder.build_archive(&device).await.unwrap();
        assert_eq!(bytes_a, bytes_b);
        assert_eq!(sha_a, sha_b);
    }

    #[tokio::test]
    async fn group_prefix_scenario_end_to_end() {
        let store = test_store().await;
        let device = register(&store, "ap-1").await;
        store.set_global_variable("wan_proto", "static").await.unwrap();

        let g = store
            .create_group(&CreateGroupRequest {
                name: "branch".to_string(),
                description: None,
            })
            .await
            .unwrap();
        store.add_group_member(g.id, &device.uuid).await.unwrap();

        let root = store.create_root_prefix("10.0.0.0/16", "").await.unwrap();
        store.allocate_child_prefix(root.id, 24, "other").await.unwrap();
        let child = store.allocate_child_prefix(root.id, 24, "branch").await.unwrap();
        assert_eq!(child.cidr, "10.0.1.0/24");
        store.assign_prefix_to_group(g.id, child.id).await.unwrap();
        let lease = store.assign_address(child.id, &device.uuid).await.unwrap();
        assert_eq!(lease.address, "10.0.1.2");

        store
            .create_template(&CreateTemplateRequest {
                name: "network".to_string(),
                path: "etc/config/network".to_string(),
                body: "option ipaddr '{{ vars.ipv4_address }}'\noption gateway '{{ vars.ipv4_gateway }}'\n"
                    .to_string(),
                kind: "go".to_string(),
                required: true,
                is_default: false,
            })
            .await
            .unwrap();

        let builder = ConfigBuilder::new(store);
        let files = builder.build_files(&device).await.unwrap();
        let network = &files["etc/config/network"];
        assert!(network.contains("option ipaddr '10.0.1.2'"));
        assert!(network.contains("option gateway '10.0.1.1'"));
    }
}
