use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::{map_endpoint_row, map_ippool_row, map_netgw_row};

const SELECT_NETGW: &str = r#"
    SELECT g.id, g.hostname, g.ip, g.created_at, g.updated_at,
           COALESCE(COUNT(p.id), 0) as pool_count
    FROM netgws g
    LEFT JOIN ippools p ON p.netgw_id = g.id
"#;

const SELECT_IPPOOL: &str = r#"
    SELECT id, netgw_id, type, net, netmask, ip_pool_start, ip_pool_end, router_ip,
           broadcast_ip, version, description, created_at, updated_at
    FROM ippools
"#;

const SELECT_ENDPOINT: &str = r#"
    SELECT id, hostname, mac, type, fixed_ip, ip, description, created_at, updated_at
    FROM endpoints
"#;

/// Network gateway database operations
pub struct NetGwRepo;

impl NetGwRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<NetGw>> {
        let rows = sqlx::query(&format!("{} GROUP BY g.id ORDER BY g.hostname", SELECT_NETGW))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_netgw_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<NetGw>> {
        let row = sqlx::query(&format!("{} WHERE g.id = ? GROUP BY g.id", SELECT_NETGW))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_netgw_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateNetGwRequest) -> Result<NetGw> {
        let now = Utc::now();

        let result = sqlx::query("INSERT INTO netgws (hostname, ip, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&req.hostname)
            .bind(&req.ip)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("NetGw not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &CreateNetGwRequest) -> Result<NetGw> {
        let result = sqlx::query("UPDATE netgws SET hostname = ?, ip = ?, updated_at = ? WHERE id = ?")
            .bind(&req.hostname)
            .bind(&req.ip)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("NetGw", &id.to_string()).into());
        }

        Self::get(pool, id)
            .await?
            .context("NetGw not found after update")
    }

    /// Delete a gateway; its pools go with it
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM netgws WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("NetGw", &id.to_string()).into());
        }
        Ok(())
    }
}

/// IP pool database operations
pub struct IpPoolRepo;

impl IpPoolRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<IpPool>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_IPPOOL))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_ippool_row).collect())
    }

    /// Pools of one gateway in id order
    pub async fn list_by_netgw(pool: &Pool<Sqlite>, netgw_id: i64) -> Result<Vec<IpPool>> {
        let rows = sqlx::query(&format!("{} WHERE netgw_id = ? ORDER BY id", SELECT_IPPOOL))
            .bind(netgw_id)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_ippool_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<IpPool>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_IPPOOL))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_ippool_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateIpPoolRequest) -> Result<IpPool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO ippools (netgw_id, type, net, netmask, ip_pool_start, ip_pool_end, router_ip,
                                 broadcast_ip, version, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.netgw_id)
        .bind(req.pool_type.as_str())
        .bind(&req.net)
        .bind(&req.netmask)
        .bind(&req.ip_pool_start)
        .bind(&req.ip_pool_end)
        .bind(&req.router_ip)
        .bind(req.broadcast_ip.clone().unwrap_or_default())
        .bind(req.version)
        .bind(req.description.clone().unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("IpPool not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &CreateIpPoolRequest) -> Result<IpPool> {
        let result = sqlx::query(
            r#"
            UPDATE ippools SET netgw_id = ?, type = ?, net = ?, netmask = ?, ip_pool_start = ?, ip_pool_end = ?,
                               router_ip = ?, broadcast_ip = ?, version = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.netgw_id)
        .bind(req.pool_type.as_str())
        .bind(&req.net)
        .bind(&req.netmask)
        .bind(&req.ip_pool_start)
        .bind(&req.ip_pool_end)
        .bind(&req.router_ip)
        .bind(req.broadcast_ip.clone().unwrap_or_default())
        .bind(req.version)
        .bind(req.description.clone().unwrap_or_default())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("IpPool", &id.to_string()).into());
        }

        Self::get(pool, id)
            .await?
            .context("IpPool not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM ippools WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("IpPool", &id.to_string()).into());
        }
        Ok(())
    }
}

/// Endpoint database operations
pub struct EndpointRepo;

impl EndpointRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query(&format!("{} ORDER BY hostname", SELECT_ENDPOINT))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_endpoint_row).collect())
    }

    /// Endpoints holding a static address
    pub async fn list_fixed_ip(pool: &Pool<Sqlite>) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query(&format!("{} WHERE fixed_ip = 1 AND ip != '' ORDER BY id", SELECT_ENDPOINT))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_endpoint_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ENDPOINT))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_endpoint_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateEndpointRequest) -> Result<Endpoint> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO endpoints (hostname, mac, type, fixed_ip, ip, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.hostname)
        .bind(crate::utils::normalize_mac(&req.mac))
        .bind(req.endpoint_type.as_str())
        .bind(req.fixed_ip as i32)
        .bind(req.ip.clone().unwrap_or_default())
        .bind(req.description.clone().unwrap_or_default())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Endpoint not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &CreateEndpointRequest) -> Result<Endpoint> {
        let result = sqlx::query(
            r#"
            UPDATE endpoints SET hostname = ?, mac = ?, type = ?, fixed_ip = ?, ip = ?, description = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.hostname)
        .bind(crate::utils::normalize_mac(&req.mac))
        .bind(req.endpoint_type.as_str())
        .bind(req.fixed_ip as i32)
        .bind(req.ip.clone().unwrap_or_default())
        .bind(req.description.clone().unwrap_or_default())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Endpoint", &id.to_string()).into());
        }

        Self::get(pool, id)
            .await?
            .context("Endpoint not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Endpoint", &id.to_string()).into());
        }
        Ok(())
    }
}
