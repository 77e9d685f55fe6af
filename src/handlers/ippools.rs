use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::dhcp::{is_secondary, pool_ranges, validate_pool};
use crate::models::*;
use crate::utils::{is_valid_hostname, is_valid_ipv4, is_valid_mac, mask_to_cidr, wildcard_mask};
use crate::AppState;

use super::{created, ApiError};

// ========== Network gateways ==========

fn check_netgw(req: &CreateNetGwRequest) -> Result<(), ApiError> {
    if !is_valid_hostname(&req.hostname) {
        return Err(ApiError::bad_request("invalid hostname"));
    }
    if !req.ip.is_empty() && !is_valid_ipv4(&req.ip) {
        return Err(ApiError::bad_request("invalid ip"));
    }
    Ok(())
}

async fn get_netgw_or_404(state: &AppState, id: i64) -> Result<NetGw, ApiError> {
    state
        .store
        .get_netgw(id)
        .await?
        .ok_or_else(|| ApiError::not_found("netgw"))
}

/// List all network gateways
pub async fn list_netgws(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NetGw>>, ApiError> {
    Ok(Json(state.store.list_netgws().await?))
}

pub async fn get_netgw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<NetGw>, ApiError> {
    Ok(Json(get_netgw_or_404(&state, id).await?))
}

pub async fn create_netgw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNetGwRequest>,
) -> Result<(StatusCode, Json<NetGw>), ApiError> {
    check_netgw(&req)?;
    let netgw = state.store.create_netgw(&req).await?;
    Ok(created(netgw))
}

/// Update a gateway; a renamed gateway loses its old dhcpd fragment
pub async fn update_netgw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateNetGwRequest>,
) -> Result<Json<NetGw>, ApiError> {
    check_netgw(&req)?;
    let existing = get_netgw_or_404(&state, id).await?;

    let netgw = state.store.update_netgw(id, &req).await?;
    if existing.hostname != netgw.hostname {
        state.dhcp.remove(&existing.hostname).await?;
    }
    Ok(Json(netgw))
}

/// Delete a gateway together with its pools, dhcpd fragment and include line
pub async fn delete_netgw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let netgw = get_netgw_or_404(&state, id).await?;
    state.dhcp.remove(&netgw.hostname).await?;
    state.store.delete_netgw(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn render_dhcp(state: &AppState, id: i64) -> Result<(NetGw, Vec<IpPool>, Vec<Endpoint>), ApiError> {
    let netgw = get_netgw_or_404(state, id).await?;
    let pools = state.store.list_ippools_by_netgw(id).await?;
    let endpoints = state.store.list_fixed_ip_endpoints().await?;
    Ok((netgw, pools, endpoints))
}

/// Preview the dhcpd fragment of a gateway
pub async fn preview_netgw_dhcp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DhcpConfigResponse>, ApiError> {
    let (netgw, pools, endpoints) = render_dhcp(&state, id).await?;
    let content = state.dhcp.render(&netgw, &pools, &endpoints)?;
    Ok(Json(DhcpConfigResponse {
        netgw_id: id,
        path: state.dhcp.file_path(&netgw.hostname).to_string_lossy().to_string(),
        content,
    }))
}

/// Write the dhcpd fragment of a gateway and include it from dhcpd.conf
pub async fn write_netgw_dhcp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DhcpConfigResponse>, ApiError> {
    let (netgw, pools, endpoints) = render_dhcp(&state, id).await?;
    let (path, content) = state.dhcp.write(&netgw, &pools, &endpoints).await?;
    Ok(Json(DhcpConfigResponse {
        netgw_id: id,
        path: path.to_string_lossy().to_string(),
        content,
    }))
}

// ========== IP pools ==========

async fn check_pool(state: &AppState, req: &CreateIpPoolRequest) -> Result<(), ApiError> {
    validate_pool(req).map_err(ApiError::bad_request)?;
    get_netgw_or_404(state, req.netgw_id).await?;
    Ok(())
}

pub async fn list_ippools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<IpPool>>, ApiError> {
    Ok(Json(state.store.list_ippools().await?))
}

pub async fn get_ippool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<IpPool>, ApiError> {
    let pool = state
        .store
        .get_ippool(id)
        .await?
        .ok_or_else(|| ApiError::not_found("ippool"))?;
    Ok(Json(pool))
}

pub async fn create_ippool(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIpPoolRequest>,
) -> Result<(StatusCode, Json<IpPool>), ApiError> {
    check_pool(&state, &req).await?;
    let pool = state.store.create_ippool(&req).await?;
    Ok(created(pool))
}

pub async fn update_ippool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateIpPoolRequest>,
) -> Result<Json<IpPool>, ApiError> {
    check_pool(&state, &req).await?;
    let pool = state.store.update_ippool(id, &req).await?;
    Ok(Json(pool))
}

pub async fn delete_ippool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_ippool(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dynamic ranges of a pool after carving out static reservations
pub async fn get_ippool_ranges(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PoolRangesResponse>, ApiError> {
    let pool = state
        .store
        .get_ippool(id)
        .await?
        .ok_or_else(|| ApiError::not_found("ippool"))?;
    let siblings = state.store.list_ippools_by_netgw(pool.netgw_id).await?;
    let endpoints = state.store.list_fixed_ip_endpoints().await?;

    let (cidr, wildcard) = if pool.version == 4 {
        (mask_to_cidr(&pool.netmask).ok(), wildcard_mask(&pool.netmask).ok())
    } else {
        (Some(pool.netmask.clone()), None)
    };

    Ok(Json(PoolRangesResponse {
        pool_id: id,
        cidr,
        wildcard_mask: wildcard,
        secondary: is_secondary(&pool, &siblings),
        ranges: pool_ranges(&pool, &endpoints),
    }))
}

// ========== Endpoints ==========

fn check_endpoint(req: &CreateEndpointRequest) -> Result<(), ApiError> {
    if !is_valid_hostname(&req.hostname) {
        return Err(ApiError::bad_request("invalid hostname"));
    }
    if !is_valid_mac(&req.mac) {
        return Err(ApiError::bad_request("invalid mac"));
    }
    match req.ip.as_deref() {
        Some(ip) if !ip.is_empty() && !is_valid_ipv4(ip) => Err(ApiError::bad_request("invalid ip")),
        None | Some("") if req.fixed_ip => Err(ApiError::bad_request("fixed_ip requires an ip")),
        _ => Ok(()),
    }
}

pub async fn list_endpoints(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Endpoint>>, ApiError> {
    Ok(Json(state.store.list_endpoints().await?))
}

pub async fn get_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Endpoint>, ApiError> {
    let endpoint = state
        .store
        .get_endpoint(id)
        .await?
        .ok_or_else(|| ApiError::not_found("endpoint"))?;
    Ok(Json(endpoint))
}

pub async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<(StatusCode, Json<Endpoint>), ApiError> {
    check_endpoint(&req)?;
    let endpoint = state.store.create_endpoint(&req).await?;
    Ok(created(endpoint))
}

pub async fn update_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<Json<Endpoint>, ApiError> {
    check_endpoint(&req)?;
    let endpoint = state.store.update_endpoint(id, &req).await?;
    Ok(Json(endpoint))
}

pub async fn delete_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_endpoint(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
