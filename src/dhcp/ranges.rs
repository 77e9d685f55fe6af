//! Address range allocation for dynamic leasing.

use crate::models::{AddressRange, Endpoint, IpPool, PoolType};
use crate::utils::{parse_ipv4_to_u32, u32_to_ipv4};

/// Split `[start, end]` into the sub-ranges not covered by `reserved`.
///
/// Reserved addresses outside the range are ignored and duplicates collapse.
/// An empty result means every address in the range is reserved.
pub fn free_ranges(start: u32, end: u32, reserved: &[u32]) -> Vec<AddressRange> {
    let mut taken: Vec<u32> = reserved
        .iter()
        .copied()
        .filter(|ip| *ip >= start && *ip <= end)
        .collect();

    if taken.is_empty() {
        return vec![AddressRange { start, end }];
    }

    // descending so pop() yields the smallest
    taken.sort_unstable_by(|a, b| b.cmp(a));
    taken.dedup();

    let mut ranges = Vec::new();
    // u64 so a reservation at 255.255.255.255 cannot wrap the cursor
    let mut cursor = start as u64;
    while let Some(ip) = taken.pop() {
        let ip = ip as u64;
        if ip == cursor {
            cursor += 1;
            continue;
        }
        ranges.push(AddressRange {
            start: cursor as u32,
            end: (ip - 1) as u32,
        });
        cursor = ip + 1;
    }

    if cursor <= end as u64 {
        ranges.push(AddressRange {
            start: cursor as u32,
            end,
        });
    }

    ranges
}

/// Statically reserved addresses of fixed-IP endpoints. Unparseable addresses are skipped.
pub fn reserved_addresses(endpoints: &[Endpoint]) -> Vec<u32> {
    endpoints
        .iter()
        .filter(|ep| ep.fixed_ip)
        .filter_map(|ep| ep.ip.as_deref())
        .filter_map(|ip| parse_ipv4_to_u32(ip).ok())
        .collect()
}

/// Dynamic ranges of a pool as dotted address pairs.
///
/// Only public CPE v4 pools have reservations carved out; every other pool
/// is handed out as declared.
pub fn pool_ranges(pool: &IpPool, endpoints: &[Endpoint]) -> Vec<(String, String)> {
    let declared = vec![(pool.ip_pool_start.clone(), pool.ip_pool_end.clone())];
    if pool.pool_type != PoolType::CpePub || pool.version != 4 {
        return declared;
    }

    let (Ok(start), Ok(end)) = (
        parse_ipv4_to_u32(&pool.ip_pool_start),
        parse_ipv4_to_u32(&pool.ip_pool_end),
    ) else {
        return declared;
    };

    free_ranges(start, end, &reserved_addresses(endpoints))
        .into_iter()
        .map(|r| (u32_to_ipv4(r.start), u32_to_ipv4(r.end)))
        .collect()
}

/// dhcpd `range` clause; a single-address range names the address once
pub fn range_clause(start: &str, end: &str) -> String {
    if start == end {
        format!("range {};", start)
    } else {
        format!("range {} {};", start, end)
    }
}
