//! Address pool rules.

use crate::models::{CreateIpPoolRequest, IpPool, PoolType};
use crate::utils::{parse_ipv4_to_u32, parse_ipv6_to_u128, parse_netmask, parse_prefix6, subnet_bounds, subnet_bounds6};

/// An address of either family widened to u128 so v4 and v6 share the checks
fn parse_addr(version: i32, ip: &str) -> Result<u128, String> {
    match version {
        4 => parse_ipv4_to_u32(ip).map(u128::from),
        6 => parse_ipv6_to_u128(ip),
        other => Err(format!("Unsupported IP version: {}", other)),
    }
}

fn bounds(version: i32, net: u128, netmask: &str) -> Result<(u128, u128), String> {
    if version == 6 {
        let len = parse_prefix6(netmask)?;
        return Ok(subnet_bounds6(net, len));
    }
    let len = parse_netmask(netmask)?;
    // v4 addresses were widened from u32 by parse_addr
    let (lo, hi) = subnet_bounds(net as u32, len);
    Ok((u128::from(lo), u128::from(hi)))
}

/// Check a pool against its subnet: netmask valid, start at or above the
/// network address, end at or above start, start/end/router inside the
/// subnet, broadcast inside the subnet and at or above end.
pub fn validate_pool(req: &CreateIpPoolRequest) -> Result<(), String> {
    let version = req.version;
    let net = parse_addr(version, &req.net).map_err(|e| format!("net: {}", e))?;
    let (lo, hi) = bounds(version, net, &req.netmask).map_err(|e| format!("netmask: {}", e))?;

    let in_subnet = |field: &str, ip: &str| -> Result<u128, String> {
        let addr = parse_addr(version, ip).map_err(|e| format!("{}: {}", field, e))?;
        if addr < lo || addr > hi {
            return Err(format!(
                "{}: {} is not within {}{}",
                field,
                ip,
                req.net,
                if req.netmask.starts_with('/') {
                    req.netmask.clone()
                } else {
                    format!(" netmask {}", req.netmask)
                }
            ));
        }
        Ok(addr)
    };

    let start = in_subnet("ip_pool_start", &req.ip_pool_start)?;
    if start < net {
        return Err(format!("ip_pool_start: {} is below the network address", req.ip_pool_start));
    }

    let end = in_subnet("ip_pool_end", &req.ip_pool_end)?;
    if end < start {
        return Err(format!("ip_pool_end: {} is below ip_pool_start", req.ip_pool_end));
    }

    in_subnet("router_ip", &req.router_ip)?;

    if let Some(broadcast) = req.broadcast_ip.as_deref().filter(|b| !b.trim().is_empty()) {
        let addr = in_subnet("broadcast_ip", broadcast)?;
        if addr < end {
            return Err(format!("broadcast_ip: {} is below ip_pool_end", broadcast));
        }
    }

    Ok(())
}

/// Whether a pool is a secondary subnet on its gateway.
///
/// The first CM pool (v4) and the first v6 pool of a gateway are primary;
/// `pools` must be the gateway's pools in id order.
pub fn is_secondary(pool: &IpPool, pools: &[IpPool]) -> bool {
    let primary = if pool.version == 6 {
        pools.iter().find(|p| p.version == 6)
    } else {
        pools.iter().find(|p| p.version != 6 && p.pool_type == PoolType::Cm)
    };
    primary.map(|p| p.id) != Some(pool.id)
}

/// Broadcast address of a v4 pool, derived from the subnet when not stored
pub fn broadcast_address(pool: &IpPool) -> Option<String> {
    if let Some(b) = pool.broadcast_ip.as_deref().filter(|b| !b.is_empty()) {
        return Some(b.to_string());
    }
    let net = parse_ipv4_to_u32(&pool.net).ok()?;
    let len = parse_netmask(&pool.netmask).ok()?;
    Some(crate::utils::u32_to_ipv4(subnet_bounds(net, len).1))
}
