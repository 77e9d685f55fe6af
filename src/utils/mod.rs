use std::net::{Ipv4Addr, Ipv6Addr};

/// Normalize MAC address to lowercase with colons
pub fn normalize_mac(mac: &str) -> String {
    // Remove any existing separators
    let clean: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect();

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

/// Validate a MAC address in any of the common separator styles
pub fn is_valid_mac(mac: &str) -> bool {
    let hex: Vec<char> = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let seps = mac.chars().filter(|c| matches!(c, ':' | '-' | '.')).count();
    hex.len() == 12 && hex.len() + seps == mac.len()
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
pub fn is_valid_ipv4(ip: &str) -> bool {
    parse_ipv4_to_u32(ip).is_ok()
}

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Validate a plain file name (no directories, no traversal)
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Parse a dotted IPv4 address into its integer form
pub fn parse_ipv4_to_u32(ip: &str) -> Result<u32, String> {
    ip.trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| format!("Invalid IPv4 address: {}", ip))
}

/// Format an integer address as a dotted IPv4 string
pub fn u32_to_ipv4(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// Parse an IPv6 address into its integer form
pub fn parse_ipv6_to_u128(ip: &str) -> Result<u128, String> {
    ip.trim()
        .parse::<Ipv6Addr>()
        .map(u128::from)
        .map_err(|_| format!("Invalid IPv6 address: {}", ip))
}

/// Check if a netmask is written in CIDR notation (e.g. "/16")
pub fn is_cidr_notation(netmask: &str) -> bool {
    let Some(digits) = netmask.strip_prefix('/') else {
        return false;
    };
    !digits.is_empty() && digits.len() <= 3 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Parse an IPv4 netmask, dotted ("255.255.255.240") or CIDR ("/28"), into a prefix length.
/// A dotted mask is only valid when its one-bits are contiguous.
pub fn parse_netmask(netmask: &str) -> Result<u8, String> {
    let netmask: String = netmask.chars().filter(|c| !c.is_whitespace()).collect();
    if is_cidr_notation(&netmask) {
        let len: u8 = netmask[1..]
            .parse()
            .map_err(|_| format!("Invalid netmask: {}", netmask))?;
        if len > 32 {
            return Err(format!("Invalid netmask: {}", netmask));
        }
        return Ok(len);
    }

    let mask = parse_ipv4_to_u32(&netmask).map_err(|_| format!("Invalid netmask: {}", netmask))?;
    let ones = mask.leading_ones();
    if ones + mask.trailing_zeros() != 32 {
        return Err(format!("Invalid netmask: {}", netmask));
    }
    Ok(ones as u8)
}

/// Parse an IPv6 prefix length written as "/n"
pub fn parse_prefix6(netmask: &str) -> Result<u8, String> {
    let netmask = netmask.trim();
    if !is_cidr_notation(netmask) {
        return Err(format!("Invalid IPv6 prefix: {}", netmask));
    }
    let len: u8 = netmask[1..]
        .parse()
        .map_err(|_| format!("Invalid IPv6 prefix: {}", netmask))?;
    if len > 128 {
        return Err(format!("Invalid IPv6 prefix: {}", netmask));
    }
    Ok(len)
}

/// Convert a netmask to CIDR notation, e.g. "255.255.255.240" -> "/28"
pub fn mask_to_cidr(netmask: &str) -> Result<String, String> {
    Ok(format!("/{}", parse_netmask(netmask)?))
}

/// Dotted netmask as dhcpd expects it, e.g. "/28" -> "255.255.255.240"
pub fn dotted_netmask(netmask: &str) -> Result<String, String> {
    Ok(u32_to_ipv4(prefix_mask(parse_netmask(netmask)?)))
}

/// Cisco wildcard mask (inverted netmask), e.g. "255.255.255.0" -> "0.0.0.255"
pub fn wildcard_mask(netmask: &str) -> Result<String, String> {
    let len = parse_netmask(netmask)?;
    Ok(u32_to_ipv4(!prefix_mask(len)))
}

fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    }
}

/// Network and broadcast address of the subnet containing `addr`
pub fn subnet_bounds(addr: u32, prefix_len: u8) -> (u32, u32) {
    let mask = prefix_mask(prefix_len);
    let network = addr & mask;
    (network, network | !mask)
}

/// Network and last address of an IPv6 subnet
pub fn subnet_bounds6(addr: u128, prefix_len: u8) -> (u128, u128) {
    let mask = if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len.min(128)))
    };
    let network = addr & mask;
    (network, network | !mask)
}
