/// Normalize MAC address to lowercase with colons
pub fn normalize_mac(mac: &str) -> String {
    // Remove any existing separators
    let clean: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect();

    // Convert to lowercase and insert colons
    if clean.len() != 12 {
        return mac.to_lowercase();
    }

    clean
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
        .to_lowercase()
}

/// Parse a dotted-decimal IPv4 address into its u32 form.
pub fn parse_ipv4_to_u32(s: &str) -> Result<u32, String> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.len() != 4 {
        return Err(format!("invalid IPv4 address: {}", s));
    }
    let mut out: u32 = 0;
    for p in &parts {
        let octet: u8 = p
            .parse()
            .map_err(|_| format!("invalid IPv4 address: {}", s))?;
        out = (out << 8) | octet as u32;
    }
    Ok(out)
}

/// Render a u32 back into dotted-decimal form.
pub fn u32_to_ipv4(u: u32) -> String {
    format!("{}.{}.{}.{}", u >> 24, (u >> 16) & 0xff, (u >> 8) & 0xff, u & 0xff)
}

/// Parse an IPv4 CIDR "a.b.c.d/len" into (network, broadcast, prefix_length).
/// The host bits of the given address are masked off.
pub fn parse_cidr(cidr: &str) -> Result<(u32, u32, u8), String> {
    let s = cidr.trim();
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| format!("invalid CIDR: {}", s))?;
    let prefix_len: u8 = len.parse().map_err(|_| format!("invalid CIDR: {}", s))?;
    if prefix_len > 32 {
        return Err(format!("invalid prefix length: /{}", prefix_len));
    }
    let ip = parse_ipv4_to_u32(addr)?;
    let mask = prefix_mask(prefix_len);
    let network = ip & mask;
    let broadcast = network | !mask;
    Ok((network, broadcast, prefix_len))
}

/// Format a network address + length as canonical CIDR text.
pub fn format_cidr(network: u32, prefix_len: u8) -> String {
    format!("{}/{}", u32_to_ipv4(network), prefix_len)
}

/// The netmask for a prefix length, as a u32.
pub fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

/// The netmask for a prefix length, dotted-decimal (e.g. /24 -> 255.255.255.0).
pub fn netmask_string(prefix_len: u8) -> String {
    u32_to_ipv4(prefix_mask(prefix_len))
}

/// True for CIDR or address text that looks like IPv6.
pub fn looks_ipv6(s: &str) -> bool {
    s.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("AABBCCDDEEFF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4_to_u32("10.0.0.0").unwrap(), 0x0a000000);
        assert_eq!(parse_ipv4_to_u32("255.255.255.255").unwrap(), u32::MAX);
        assert!(parse_ipv4_to_u32("256.1.1.1").is_err());
        assert!(parse_ipv4_to_u32("1.2.3").is_err());
        assert!(parse_ipv4_to_u32("not-an-ip").is_err());
    }

    #[test]
    fn test_roundtrip_ipv4() {
        for s in ["0.0.0.0", "10.0.1.2", "192.168.255.1"] {
            assert_eq!(u32_to_ipv4(parse_ipv4_to_u32(s).unwrap()), s);
        }
    }

    #[test]
    fn test_parse_cidr() {
        let (net, bcast, len) = parse_cidr("10.0.0.0/16").unwrap();
        assert_eq!(u32_to_ipv4(net), "10.0.0.0");
        assert_eq!(u32_to_ipv4(bcast), "10.0.255.255");
        assert_eq!(len, 16);

        // host bits are masked off
        let (net, _, _) = parse_cidr("10.0.1.77/24").unwrap();
        assert_eq!(u32_to_ipv4(net), "10.0.1.0");

        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(parse_cidr("10.0.0.0").is_err());
    }

    #[test]
    fn test_netmask_string() {
        assert_eq!(netmask_string(24), "255.255.255.0");
        assert_eq!(netmask_string(16), "255.255.0.0");
        assert_eq!(netmask_string(0), "0.0.0.0");
        assert_eq!(netmask_string(32), "255.255.255.255");
    }
}
