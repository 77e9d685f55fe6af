use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None — used when DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a Configfile struct
pub fn map_configfile_row(row: &SqliteRow) -> Configfile {
    let public: i32 = row.get("public");
    Configfile {
        id: row.get("id"),
        name: row.get("name"),
        device: none_if_empty(row.get("device")).and_then(|d| d.parse().ok()),
        parent_id: row.try_get::<Option<i64>, _>("parent_id").ok().flatten(),
        text: row.get("text"),
        firmware: row.get("firmware"),
        cvc: row.get("cvc"),
        public: public == 1,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

/// Map a SQLite row to a NetGw struct (with aggregated pool count)
pub fn map_netgw_row(row: &SqliteRow) -> NetGw {
    NetGw {
        id: row.get("id"),
        hostname: row.get("hostname"),
        ip: row.get("ip"),
        pool_count: Some(row.get("pool_count")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an IpPool struct. Unknown pool types fall back to CM.
pub fn map_ippool_row(row: &SqliteRow) -> IpPool {
    let pool_type: String = row.get("type");
    IpPool {
        id: row.get("id"),
        netgw_id: row.get("netgw_id"),
        pool_type: pool_type.parse().unwrap_or(PoolType::Cm),
        net: row.get("net"),
        netmask: row.get("netmask"),
        ip_pool_start: row.get("ip_pool_start"),
        ip_pool_end: row.get("ip_pool_end"),
        router_ip: row.get("router_ip"),
        broadcast_ip: none_if_empty(row.get("broadcast_ip")),
        version: row.get("version"),
        description: none_if_empty(row.get("description")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to an Endpoint struct
pub fn map_endpoint_row(row: &SqliteRow) -> Endpoint {
    let endpoint_type: String = row.get("type");
    let fixed_ip: i32 = row.get("fixed_ip");
    Endpoint {
        id: row.get("id"),
        hostname: row.get("hostname"),
        mac: row.get("mac"),
        endpoint_type: endpoint_type.parse().unwrap_or(EndpointType::Cpe),
        fixed_ip: fixed_ip == 1,
        ip: none_if_empty(row.get("ip")),
        description: none_if_empty(row.get("description")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
