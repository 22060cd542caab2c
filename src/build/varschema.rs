//! Catalog of known configuration variables with per-key validation and
//! normalization. Values are canonicalized on write so templates always see
//! one spelling (lowercase protocols, dotted netmasks, comma-joined lists).

use std::net::{Ipv4Addr, Ipv6Addr};

use regex_lite::Regex;

use crate::utils::netmask_string;

/// Typed schema failures, downcast by the API layer for status mapping.
#[derive(Debug)]
pub enum SchemaError {
    UnknownVariable(String),
    Invalid { key: String, reason: String },
    MissingRequired(Vec<String>),
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::UnknownVariable(key) => write!(f, "unknown variable: {}", key),
            SchemaError::Invalid { key, reason } => write!(f, "invalid {}: {}", key, reason),
            SchemaError::MissingRequired(keys) => {
                write!(f, "missing required vars: {}", keys.join(", "))
            }
        }
    }
}

impl std::error::Error for SchemaError {}

type Normalizer = fn(&str) -> Result<String, String>;
type RequiresFn = fn(&dyn Fn(&str) -> Option<String>) -> bool;

pub struct VarDef {
    pub key: &'static str,
    pub example: &'static str,
    pub validate: Normalizer,
    pub required: bool,
    pub requires: Option<RequiresFn>,
}

fn norm_hostname(v: &str) -> Result<String, String> {
    let s = v.trim().to_lowercase();
    let re = Regex::new(
        r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$",
    )
    .map_err(|e| e.to_string())?;
    if s.is_empty() || s.len() > 253 || !re.is_match(&s) {
        return Err("invalid hostname".to_string());
    }
    Ok(s)
}

fn norm_tz(v: &str) -> Result<String, String> {
    let s = v.trim();
    let re = Regex::new(r"^[A-Za-z]+(/[A-Za-z0-9_+-]+)+$").map_err(|e| e.to_string())?;
    if s.is_empty() || s.len() > 128 || !re.is_match(s) {
        return Err("invalid timezone (Area/City)".to_string());
    }
    Ok(s.to_string())
}

fn norm_bool(v: &str) -> Result<String, String> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok("1".to_string()),
        "0" | "false" | "no" | "off" => Ok("0".to_string()),
        _ => Err("invalid bool".to_string()),
    }
}

fn norm_int_range(v: &str, min: i64, max: i64) -> Result<String, String> {
    let n: i64 = v.trim().parse().map_err(|_| "not an integer".to_string())?;
    if n < min || n > max {
        return Err(format!("int out of range [{}..{}]", min, max));
    }
    Ok(n.to_string())
}

fn norm_int_or_auto(v: &str, min: i64, max: i64) -> Result<String, String> {
    let s = v.trim().to_lowercase();
    // Empty means auto, the template decides.
    if s == "auto" || s.is_empty() {
        return Ok(String::new());
    }
    norm_int_range(&s, min, max)
}

fn norm_ipv4(v: &str) -> Result<String, String> {
    let ip: Ipv4Addr = v.trim().parse().map_err(|_| "invalid ipv4".to_string())?;
    Ok(ip.to_string())
}

fn norm_ipv6(v: &str) -> Result<String, String> {
    let ip: Ipv6Addr = v.trim().parse().map_err(|_| "invalid ipv6".to_string())?;
    Ok(ip.to_string())
}

/// Accepts a prefix length ("24") or a dotted mask; always emits dotted form.
fn norm_netmask(v: &str) -> Result<String, String> {
    let s = v.trim();
    if let Ok(n) = s.parse::<u8>() {
        if n <= 32 {
            return Ok(netmask_string(n));
        }
        return Err("invalid netmask".to_string());
    }
    let ip: Ipv4Addr = s.parse().map_err(|_| "invalid netmask".to_string())?;
    Ok(ip.to_string())
}

/// Splits on commas and newlines, trims entries, joins back with commas.
fn norm_list(v: &str) -> Result<String, String> {
    let parts: Vec<&str> = v
        .split(|c| c == ',' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err("empty list".to_string());
    }
    Ok(parts.join(","))
}

fn norm_wifi_psk(v: &str) -> Result<String, String> {
    let s = v.trim();
    if s.len() < 8 || s.len() > 63 {
        return Err("wifi psk must be 8..63 chars".to_string());
    }
    Ok(s.to_string())
}

fn norm_country(v: &str) -> Result<String, String> {
    let s = v.trim().to_uppercase();
    if s.len() != 2 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err("country must be ISO 3166-1 alpha-2".to_string());
    }
    Ok(s)
}

fn norm_wan_proto(v: &str) -> Result<String, String> {
    let s = v.trim().to_lowercase();
    match s.as_str() {
        "dhcp" | "static" | "pppoe" => Ok(s),
        _ => Err("wan_proto must be dhcp|static|pppoe".to_string()),
    }
}

fn norm_wifi_band(v: &str) -> Result<String, String> {
    let s = v.trim().to_lowercase();
    match s.as_str() {
        "2g" | "5g" | "6g" => Ok(s),
        _ => Err("wifi_band must be 2g|5g|6g".to_string()),
    }
}

fn norm_wifi_encryption(v: &str) -> Result<String, String> {
    let s = v.trim().to_lowercase();
    match s.as_str() {
        "psk2" | "psk-mixed" | "sae" => Ok(s),
        _ => Err("wifi_encryption invalid".to_string()),
    }
}

fn norm_ssid(v: &str) -> Result<String, String> {
    let s = v.trim();
    if s.is_empty() {
        return Err("empty ssid".to_string());
    }
    Ok(s.to_string())
}

fn pass(v: &str) -> Result<String, String> {
    Ok(v.trim().to_string())
}

fn lan_vlan(v: &str) -> Result<String, String> {
    norm_int_range(v, 1, 4094)
}

fn ipv6_prefixlen(v: &str) -> Result<String, String> {
    norm_int_range(v, 0, 128)
}

fn wifi_channel(v: &str) -> Result<String, String> {
    norm_int_or_auto(v, 1, 196)
}

fn wan_is_static(get: &dyn Fn(&str) -> Option<String>) -> bool {
    get("wan_proto").as_deref() == Some("static")
}

fn ipv6_enabled(get: &dyn Fn(&str) -> Option<String>) -> bool {
    // norm_bool canonicalizes to "1"/"0" before this runs
    get("ipv6_enable").as_deref() == Some("1")
}

/// The known-variable catalog: a sensible minimum for OpenWrt appliances.
/// Templates may of course reference more than this.
pub fn catalog() -> &'static [VarDef] {
    const CATALOG: &[VarDef] = &[
        // System
        VarDef { key: "hostname", example: "branch-ap-01", validate: norm_hostname, required: true, requires: None },
        VarDef { key: "timezone", example: "Europe/Rome", validate: norm_tz, required: false, requires: None },
        // Uplink (WAN)
        VarDef { key: "wan_proto", example: "dhcp|static|pppoe", validate: norm_wan_proto, required: true, requires: None },
        VarDef { key: "wan_iface", example: "eth0", validate: pass, required: false, requires: None },
        // IPv4 static addressing, required only when wan_proto=static
        VarDef { key: "ipv4_address", example: "10.100.0.2", validate: norm_ipv4, required: false, requires: Some(wan_is_static) },
        VarDef { key: "ipv4_netmask", example: "255.255.255.0", validate: norm_netmask, required: false, requires: Some(wan_is_static) },
        VarDef { key: "ipv4_gateway", example: "10.100.0.1", validate: norm_ipv4, required: false, requires: Some(wan_is_static) },
        VarDef { key: "dns_servers", example: "1.1.1.1,8.8.8.8", validate: norm_list, required: false, requires: None },
        // IPv6 (optional)
        VarDef { key: "ipv6_enable", example: "1", validate: norm_bool, required: false, requires: None },
        VarDef { key: "ipv6_address", example: "2001:db8::2", validate: norm_ipv6, required: false, requires: Some(ipv6_enabled) },
        VarDef { key: "ipv6_prefixlen", example: "64", validate: ipv6_prefixlen, required: false, requires: None },
        VarDef { key: "ipv6_gateway", example: "fe80::1", validate: norm_ipv6, required: false, requires: None },
        VarDef { key: "dns6_servers", example: "2606:4700:4700::1111", validate: norm_list, required: false, requires: None },
        // LAN / VLAN
        VarDef { key: "lan_iface", example: "br-lan", validate: pass, required: false, requires: None },
        VarDef { key: "lan_vlan_id", example: "1", validate: lan_vlan, required: false, requires: None },
        VarDef { key: "mgmt_vlan_id", example: "10", validate: lan_vlan, required: false, requires: None },
        // NTP / Syslog
        VarDef { key: "ntp_servers", example: "pool.ntp.org,time.cloudflare.com", validate: norm_list, required: false, requires: None },
        VarDef { key: "syslog_server", example: "10.0.0.10", validate: pass, required: false, requires: None },
        // SSH
        VarDef { key: "ssh_authorized_keys", example: "ssh-ed25519 AAA...,ssh-rsa BBB...", validate: norm_list, required: false, requires: None },
        // Wi-Fi
        VarDef { key: "wifi_country", example: "IT", validate: norm_country, required: false, requires: None },
        VarDef { key: "wifi_band", example: "2g|5g|6g", validate: norm_wifi_band, required: false, requires: None },
        VarDef { key: "wifi_channel", example: "auto|1..165", validate: wifi_channel, required: false, requires: None },
        VarDef { key: "wifi_htmode", example: "HT20|VHT40|HE80", validate: pass, required: false, requires: None },
        VarDef { key: "wifi_ssid", example: "CorpWiFi", validate: norm_ssid, required: false, requires: None },
        VarDef { key: "wifi_encryption", example: "psk2|sae|psk-mixed", validate: norm_wifi_encryption, required: false, requires: None },
        VarDef { key: "wifi_psk", example: "********", validate: norm_wifi_psk, required: false, requires: None },
    ];
    CATALOG
}

pub fn def(key: &str) -> Option<&'static VarDef> {
    catalog().iter().find(|d| d.key == key)
}

/// Validate and normalize a single variable by key.
pub fn validate_one(key: &str, value: &str) -> Result<String, SchemaError> {
    let def = def(key).ok_or_else(|| SchemaError::UnknownVariable(key.to_string()))?;
    (def.validate)(value).map_err(|reason| SchemaError::Invalid {
        key: key.to_string(),
        reason,
    })
}

/// Check unconditional and conditional requirements against merged variables.
pub fn validate_all(get: &dyn Fn(&str) -> Option<String>) -> Result<(), SchemaError> {
    let mut missing = Vec::new();
    for d in catalog() {
        let need = d.required || d.requires.map(|f| f(get)).unwrap_or(false);
        if need {
            match get(d.key) {
                Some(v) if !v.trim().is_empty() => {}
                _ => missing.push(d.key.to_string()),
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingRequired(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn getter<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |k| map.get(k).map(|v| v.to_string())
    }

    #[test]
    fn hostname_lowercases_and_validates() {
        assert_eq!(validate_one("hostname", " Branch-AP-01 ").unwrap(), "branch-ap-01");
        assert!(validate_one("hostname", "-bad-").is_err());
        assert!(validate_one("hostname", "").is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        match validate_one("no_such_var", "x") {
            Err(SchemaError::UnknownVariable(k)) => assert_eq!(k, "no_such_var"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn netmask_accepts_length_or_dotted() {
        assert_eq!(validate_one("ipv4_netmask", "24").unwrap(), "255.255.255.0");
        assert_eq!(validate_one("ipv4_netmask", "255.255.0.0").unwrap(), "255.255.0.0");
        assert!(validate_one("ipv4_netmask", "33").is_err());
    }

    #[test]
    fn bool_normalizes_to_digits() {
        assert_eq!(validate_one("ipv6_enable", "yes").unwrap(), "1");
        assert_eq!(validate_one("ipv6_enable", "Off").unwrap(), "0");
        assert!(validate_one("ipv6_enable", "maybe").is_err());
    }

    #[test]
    fn list_joins_with_commas() {
        assert_eq!(
            validate_one("dns_servers", "1.1.1.1\n 8.8.8.8, ").unwrap(),
            "1.1.1.1,8.8.8.8"
        );
        assert!(validate_one("dns_servers", "  ").is_err());
    }

    #[test]
    fn channel_auto_becomes_empty() {
        assert_eq!(validate_one("wifi_channel", "auto").unwrap(), "");
        assert_eq!(validate_one("wifi_channel", "36").unwrap(), "36");
        assert!(validate_one("wifi_channel", "999").is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        for (key, raw) in [
            ("hostname", "Branch-AP-01"),
            ("wan_proto", "STATIC"),
            ("ipv4_netmask", "24"),
            ("dns_servers", "1.1.1.1 ,8.8.8.8"),
            ("wifi_country", "it"),
        ] {
            let once = validate_one(key, raw).unwrap();
            let twice = validate_one(key, &once).unwrap();
            assert_eq!(once, twice, "{} not idempotent", key);
        }
    }

    #[test]
    fn static_wan_requires_addressing() {
        let mut map = HashMap::new();
        map.insert("hostname", "ap-1");
        map.insert("wan_proto", "static");
        let err = validate_all(&getter(&map)).unwrap_err();
        match err {
            SchemaError::MissingRequired(keys) => {
                assert!(keys.contains(&"ipv4_address".to_string()));
                assert!(keys.contains(&"ipv4_netmask".to_string()));
                assert!(keys.contains(&"ipv4_gateway".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }

        map.insert("ipv4_address", "10.0.0.2");
        map.insert("ipv4_netmask", "255.255.255.0");
        map.insert("ipv4_gateway", "10.0.0.1");
        assert!(validate_all(&getter(&map)).is_ok());
    }

    #[test]
    fn dhcp_wan_needs_no_addressing() {
        let mut map = HashMap::new();
        map.insert("hostname", "ap-1");
        map.insert("wan_proto", "dhcp");
        assert!(validate_all(&getter(&map)).is_ok());
    }
}
