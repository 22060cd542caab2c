//! Variable and template resolution for a device.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use super::varschema;
use crate::db::Store;
use crate::models::{Device, ResolutionLayer, Template};
use crate::utils::{netmask_string, parse_cidr, u32_to_ipv4};

/// Flat merged variables plus the provenance stack behind them.
#[derive(Debug)]
pub struct ResolvedVars {
    pub vars: HashMap<String, String>,
    pub layers: Vec<ResolutionLayer>,
}

/// Merge variables for a device: global, then each group ascending by id,
/// then device, then IPAM-derived ipv4 fallbacks for keys still unset, then
/// device identity. Catalog keys are re-validated in normalized form and
/// required keys checked; any failure aborts with no partial result.
pub async fn resolve_variables(store: &Store, device: &Device) -> Result<ResolvedVars> {
    let mut merged: HashMap<String, String> = HashMap::new();
    let mut layers: Vec<ResolutionLayer> = Vec::new();

    let mut global_layer = HashMap::new();
    for v in store.list_global_variables().await? {
        global_layer.insert(v.key.clone(), v.value.clone());
        merged.insert(v.key, v.value);
    }
    layers.push(ResolutionLayer {
        source: "global".to_string(),
        source_type: "global".to_string(),
        variables: global_layer,
    });

    let group_ids = store.device_group_ids(&device.uuid).await?;
    for gid in &group_ids {
        let name = match store.get_group(*gid).await? {
            Some(g) => g.name,
            None => continue,
        };
        let mut layer = HashMap::new();
        for v in store.list_group_variables(*gid).await? {
            layer.insert(v.key.clone(), v.value.clone());
            merged.insert(v.key, v.value);
        }
        layers.push(ResolutionLayer {
            source: name,
            source_type: "group".to_string(),
            variables: layer,
        });
    }

    let mut device_layer = HashMap::new();
    for v in store.list_device_variables(&device.uuid).await? {
        device_layer.insert(v.key.clone(), v.value.clone());
        merged.insert(v.key, v.value);
    }
    layers.push(ResolutionLayer {
        source: device.uuid.clone(),
        source_type: "device".to_string(),
        variables: device_layer,
    });

    let ipam_layer = ipam_derived(store, device, &group_ids, &merged).await?;
    for (k, v) in &ipam_layer {
        merged.insert(k.clone(), v.clone());
    }
    layers.push(ResolutionLayer {
        source: "ipam".to_string(),
        source_type: "ipam".to_string(),
        variables: ipam_layer,
    });

    // Device identity, always available to templates.
    merged.insert("id".to_string(), device.uuid.clone());
    merged.insert("key".to_string(), device.device_key.clone());
    merged.insert("name".to_string(), device.name.clone());
    if !device.mac.is_empty() {
        merged.insert("mac_address".to_string(), device.mac.clone());
    }
    let hostname_missing = merged
        .get("hostname")
        .map(|v| v.trim().is_empty())
        .unwrap_or(true);
    if hostname_missing && !device.name.is_empty() {
        merged.insert("hostname".to_string(), device.name.clone());
    }

    // Re-validate every catalog key present, storing the normalized form.
    for def in varschema::catalog() {
        if let Some(raw) = merged.get(def.key).cloned() {
            let normalized = varschema::validate_one(def.key, &raw)?;
            merged.insert(def.key.to_string(), normalized);
        }
    }
    {
        let lookup = |key: &str| merged.get(key).cloned();
        varschema::validate_all(&lookup)?;
    }

    Ok(ResolvedVars {
        vars: merged,
        layers,
    })
}

/// Prefix facts for the device's first bound group prefix, plus address
/// fallbacks when the device holds a lease there and the operator has not
/// set the keys explicitly.
async fn ipam_derived(
    store: &Store,
    device: &Device,
    group_ids: &[i64],
    merged: &HashMap<String, String>,
) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    let prefix = match store.first_group_prefix(group_ids).await? {
        Some(p) => p,
        None => return Ok(out),
    };

    let (network, _, len) = match parse_cidr(&prefix.cidr) {
        Ok(v) => v,
        Err(_) => return Ok(out),
    };
    out.insert("ipam_group_prefix_cidr".to_string(), prefix.cidr.clone());
    out.insert("ipam_group_prefix_len".to_string(), len.to_string());
    out.insert("ipam_group_prefix_network".to_string(), u32_to_ipv4(network));
    out.insert("ipam_group_prefix_gw".to_string(), u32_to_ipv4(network.wrapping_add(1)));
    out.insert("ipam_group_prefix_netmask".to_string(), netmask_string(len));

    if !merged.contains_key("ipv4_address") {
        let lease = store
            .device_addresses(&device.uuid)
            .await?
            .into_iter()
            .find(|a| a.prefix_id == prefix.id);
        if let Some(lease) = lease {
            out.insert("ipv4_address".to_string(), lease.address);
            if !merged.contains_key("ipv4_netmask") {
                out.insert("ipv4_netmask".to_string(), netmask_string(len));
            }
            if !merged.contains_key("ipv4_gateway") {
                out.insert("ipv4_gateway".to_string(), u32_to_ipv4(network.wrapping_add(1)));
            }
        }
    }

    Ok(out)
}

/// Templates in application order: required, default, group assignments
/// (minus device blocks), device assignments (blocks never apply). Each
/// assignment stage is ordered (sort_order ASC, assignment id ASC); first
/// occurrence of a template id wins.
pub async fn resolve_templates(store: &Store, device_uuid: &str) -> Result<Vec<Template>> {
    let blocked: HashSet<i64> = store
        .device_template_blocks(device_uuid)
        .await?
        .into_iter()
        .collect();

    let mut out: Vec<Template> = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();

    for t in store.list_required_templates().await? {
        if seen.insert(t.id) {
            out.push(t);
        }
    }
    for t in store.list_default_templates().await? {
        if seen.insert(t.id) {
            out.push(t);
        }
    }

    let group_ids = store.device_group_ids(device_uuid).await?;
    let mut staged: Vec<i64> = Vec::new();
    for a in store.group_template_assignments_for_groups(&group_ids).await? {
        if blocked.contains(&a.template_id) {
            continue;
        }
        staged.push(a.template_id);
    }
    for a in store.device_template_assignments(device_uuid).await? {
        staged.push(a.template_id);
    }

    let by_id = store.templates_by_ids(&staged).await?;
    for id in staged {
        if seen.contains(&id) {
            continue;
        }
        if let Some(t) = by_id.get(&id) {
            seen.insert(id);
            out.push(t.clone());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateGroupRequest, CreateTemplateRequest, RegisterFields};

    async fn test_store() -> Store {
        Store::with_pool_size(":memory:", 1).await.expect("store")
    }

    async fn register(store: &Store, key: &str, name: &str) -> Device {
        let fields = RegisterFields {
            name: name.to_string(),
            backend: "openwrt".to_string(),
            mac: "00:11:22:33:44:55".to_string(),
        };
        let (device, _) = store.register_device(key, &fields).await.unwrap();
        device
    }

    fn tpl(name: &str, path: &str, required: bool, is_default: bool) -> CreateTemplateRequest {
        CreateTemplateRequest {
            name: name.to_string(),
            path: path.to_string(),
            body: String::new(),
            kind: "go".to_string(),
            required,
            is_default,
        }
    }

    #[tokio::test]
    async fn device_vars_win_over_group_and_global() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;

        store.set_global_variable("timezone", "UTC").await.unwrap();
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        let g = store
            .create_group(&CreateGroupRequest {
                name: "branch".to_string(),
                description: None,
            })
            .await
            .unwrap();
        store.add_group_member(g.id, &device.uuid).await.unwrap();
        store.set_group_variable(g.id, "timezone", "Europe/Rome").await.unwrap();
        store.set_group_variable(g.id, "wifi_ssid", "BranchWiFi").await.unwrap();

        store
            .set_device_variable(&device.uuid, "timezone", "Europe/Berlin")
            .await
            .unwrap();

        let resolved = resolve_variables(&store, &device).await.unwrap();
        assert_eq!(resolved.vars["timezone"], "Europe/Berlin");
        assert_eq!(resolved.vars["wifi_ssid"], "BranchWiFi");
        assert_eq!(resolved.vars["wan_proto"], "dhcp");
        // identity and hostname fallback
        assert_eq!(resolved.vars["id"], device.uuid);
        assert_eq!(resolved.vars["hostname"], "ap-1");
    }

    #[tokio::test]
    async fn later_group_wins_in_ascending_id_order() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;
        store.set_global_variable("wan_proto", "dhcp").await.unwrap();

        let g1 = store
            .create_group(&CreateGroupRequest { name: "a".to_string(), description: None })
            .await
            .unwrap();
        let g2 = store
            .create_group(&CreateGroupRequest { name: "b".to_string(), description: None })
            .await
            .unwrap();
        store.add_group_member(g2.id, &device.uuid).await.unwrap();
        store.add_group_member(g1.id, &device.uuid).await.unwrap();
        store.set_group_variable(g1.id, "syslog_server", "10.0.0.1").await.unwrap();
        store.set_group_variable(g2.id, "syslog_server", "10.0.0.2").await.unwrap();

        let resolved = resolve_variables(&store, &device).await.unwrap();
        assert_eq!(resolved.vars["syslog_server"], "10.0.0.2");
        let sources: Vec<&str> = resolved.layers.iter().map(|l| l.source.as_str()).collect();
        assert_eq!(sources, vec!["global", "a", "b", device.uuid.as_str(), "ipam"]);
    }

    #[tokio::test]
    async fn missing_required_aborts_resolution() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;
        // hostname falls back to the device name, wan_proto has no fallback
        let err = resolve_variables(&store, &device).await.unwrap_err();
        assert!(err
            .downcast_ref::<varschema::SchemaError>()
            .is_some());
    }

    #[tokio::test]
    async fn catalog_values_are_normalized_on_resolve() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;
        store.set_global_variable("wan_proto", "DHCP").await.unwrap();
        store
            .set_device_variable(&device.uuid, "ipv4_netmask", "24")
            .await
            .unwrap();

        let resolved = resolve_variables(&store, &device).await.unwrap();
        assert_eq!(resolved.vars["wan_proto"], "dhcp");
        assert_eq!(resolved.vars["ipv4_netmask"], "255.255.255.0");
    }

    #[tokio::test]
    async fn ipam_fallbacks_fill_only_missing_keys() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;
        store.set_global_variable("wan_proto", "static").await.unwrap();

        let g = store
            .create_group(&CreateGroupRequest { name: "lab".to_string(), description: None })
            .await
            .unwrap();
        store.add_group_member(g.id, &device.uuid).await.unwrap();

        let root = store.create_root_prefix("10.0.0.0/16", "").await.unwrap();
        let child = store.allocate_child_prefix(root.id, 24, "").await.unwrap();
        store.assign_prefix_to_group(g.id, child.id).await.unwrap();
        store.assign_address(child.id, &device.uuid).await.unwrap();

        // operator pins the gateway, IPAM supplies address and netmask
        store
            .set_device_variable(&device.uuid, "ipv4_gateway", "10.0.0.254")
            .await
            .unwrap();

        let resolved = resolve_variables(&store, &device).await.unwrap();
        assert_eq!(resolved.vars["ipv4_address"], "10.0.0.2");
        assert_eq!(resolved.vars["ipv4_netmask"], "255.255.255.0");
        assert_eq!(resolved.vars["ipv4_gateway"], "10.0.0.254");
        assert_eq!(resolved.vars["ipam_group_prefix_cidr"], "10.0.0.0/24");
        assert_eq!(resolved.vars["ipam_group_prefix_gw"], "10.0.0.1");
    }

    #[tokio::test]
    async fn template_order_and_blocks() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;

        let required = store.create_template(&tpl("base", "etc/base", true, false)).await.unwrap();
        let fallback = store.create_template(&tpl("defaults", "etc/defaults", false, true)).await.unwrap();
        let group_tpl = store.create_template(&tpl("branch", "etc/branch", false, false)).await.unwrap();
        let blocked_tpl = store.create_template(&tpl("wifi", "etc/wifi", false, false)).await.unwrap();
        let device_tpl = store.create_template(&tpl("local", "etc/local", false, false)).await.unwrap();

        let g = store
            .create_group(&CreateGroupRequest { name: "branch".to_string(), description: None })
            .await
            .unwrap();
        store.add_group_member(g.id, &device.uuid).await.unwrap();
        store.assign_template_to_group(g.id, group_tpl.id, true, 10).await.unwrap();
        store.assign_template_to_group(g.id, blocked_tpl.id, true, 5).await.unwrap();
        store.assign_template_to_device(&device.uuid, device_tpl.id, true, 100).await.unwrap();

        store.block_template_for_device(&device.uuid, blocked_tpl.id).await.unwrap();

        let order: Vec<i64> = resolve_templates(&store, &device.uuid)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(order, vec![required.id, fallback.id, group_tpl.id, device_tpl.id]);
    }

    #[tokio::test]
    async fn direct_assignment_overrides_block() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;

        let t = store.create_template(&tpl("wifi", "etc/wifi", false, false)).await.unwrap();
        let g = store
            .create_group(&CreateGroupRequest { name: "branch".to_string(), description: None })
            .await
            .unwrap();
        store.add_group_member(g.id, &device.uuid).await.unwrap();
        store.assign_template_to_group(g.id, t.id, true, 10).await.unwrap();
        store.block_template_for_device(&device.uuid, t.id).await.unwrap();

        // blocked through the group...
        let ids: Vec<i64> = resolve_templates(&store, &device.uuid)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert!(ids.is_empty());

        // ...but a direct assignment is an explicit opt-in
        store.assign_template_to_device(&device.uuid, t.id, true, 1).await.unwrap();
        let ids: Vec<i64> = resolve_templates(&store, &device.uuid)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![t.id]);
    }

    #[tokio::test]
    async fn group_assignments_order_globally_across_groups() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;

        let a = store.create_template(&tpl("a", "etc/a", false, false)).await.unwrap();
        let b = store.create_template(&tpl("b", "etc/b", false, false)).await.unwrap();

        let g1 = store
            .create_group(&CreateGroupRequest { name: "east".to_string(), description: None })
            .await
            .unwrap();
        let g2 = store
            .create_group(&CreateGroupRequest { name: "west".to_string(), description: None })
            .await
            .unwrap();
        store.add_group_member(g1.id, &device.uuid).await.unwrap();
        store.add_group_member(g2.id, &device.uuid).await.unwrap();

        // lower sort_order in the later group must still come first
        store.assign_template_to_group(g2.id, a.id, true, 5).await.unwrap();
        store.assign_template_to_group(g1.id, b.id, true, 10).await.unwrap();

        let ids: Vec<i64> = resolve_templates(&store, &device.uuid)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn sort_order_determines_application_order() {
        let store = test_store().await;
        let device = register(&store, "k1", "ap-1").await;

        let a = store.create_template(&tpl("a", "etc/a", false, false)).await.unwrap();
        let b = store.create_template(&tpl("b", "etc/b", false, false)).await.unwrap();
        store.assign_template_to_device(&device.uuid, a.id, true, 20).await.unwrap();
        store.assign_template_to_device(&device.uuid, b.id, true, 10).await.unwrap();

        let ids: Vec<i64> = resolve_templates(&store, &device.uuid)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
