use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{export_tree, import_tree};
use crate::models::*;
use crate::tree::validate_configfile;
use crate::utils::is_safe_filename;
use crate::AppState;

use super::{created, ApiError};

async fn get_live(state: &AppState, id: i64) -> Result<Configfile, ApiError> {
    state
        .store
        .get_configfile(id)
        .await?
        .filter(|cf| !cf.is_deleted())
        .ok_or_else(|| ApiError::not_found("configfile"))
}

/// List all live configfiles
pub async fn list_configfiles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Configfile>>, ApiError> {
    let configfiles = state.store.list_configfiles().await?;
    Ok(Json(configfiles))
}

/// The whole live forest as nested objects
pub async fn get_configfile_tree(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConfigfileExport>>, ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    let forest = tree
        .roots()
        .into_iter()
        .map(|id| export_tree(&tree, id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(forest))
}

/// Get a single configfile by ID
pub async fn get_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Configfile>, ApiError> {
    Ok(Json(get_live(&state, id).await?))
}

/// Create a configfile after validating it against the tree and the encoder
pub async fn create_configfile(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConfigfileRequest>,
) -> Result<(StatusCode, Json<Configfile>), ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    validate_configfile(&tree, &state.compiler, None, &req).await?;

    let configfile = state.store.create_configfile(&req).await?;
    tracing::info!("Created configfile {} ({})", configfile.id, configfile.name);
    Ok(created(configfile))
}

/// Update a configfile; a device class change is pushed down to all descendants
pub async fn update_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CreateConfigfileRequest>,
) -> Result<Json<UpdateConfigfileResponse>, ApiError> {
    let existing = get_live(&state, id).await?;

    let tree = state.store.load_configfile_tree().await?;
    validate_configfile(&tree, &state.compiler, Some(id), &req).await?;

    let configfile = state.store.update_configfile(id, &req).await?;
    let propagated_to = if existing.device != configfile.device {
        state.store.propagate_device_class(id).await?
    } else {
        Vec::new()
    };

    Ok(Json(UpdateConfigfileResponse {
        configfile,
        propagated_to,
    }))
}

/// Soft-delete a configfile. Nodes with live children are kept.
pub async fn delete_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    let has_children = tree
        .children(id)
        .iter()
        .any(|c| tree.get(*c).is_some_and(|n| !n.is_deleted()));
    if has_children {
        return Err(ApiError::conflict("configfile still has children"));
    }

    state.store.delete_configfile(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted configfile. Its parent must be live.
pub async fn restore_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Configfile>, ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    let parent = tree
        .get(id)
        .and_then(|n| n.parent_id)
        .and_then(|p| tree.get(p));
    if let Some(parent) = parent.filter(|p| p.is_deleted()) {
        return Err(ApiError::conflict(format!(
            "parent configfile {} is deleted; restore it first",
            parent.id
        )));
    }

    let configfile = state.store.restore_configfile(id).await?;
    Ok(Json(configfile))
}

/// Resolved inheritance chain and effective text
pub async fn get_effective_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<EffectiveConfigResponse>, ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    let chain = tree.resolve_chain(id)?;
    let device = chain.last().and_then(|n| n.device);
    let links = chain
        .iter()
        .map(|n| ChainLink {
            id: n.id,
            name: n.name.clone(),
        })
        .collect();

    Ok(Json(EffectiveConfigResponse {
        id,
        device,
        chain: links,
        text: tree.effective_text(id)?,
    }))
}

/// Compile the effective text into the device's provisioning directory
pub async fn build_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BuildResponse>, ApiError> {
    let configfile = get_live(&state, id).await?;
    if !is_safe_filename(&configfile.name) {
        return Err(ApiError::bad_request("configfile name is not usable as a file name"));
    }

    let tree = state.store.load_configfile_tree().await?;
    let text = tree.effective_text(id)?;
    let (path, size) = state
        .compiler
        .build(configfile.device, &configfile.name, &text)
        .await?;

    tracing::info!("Built configfile {} into {} ({} bytes)", id, path.display(), size);
    Ok(Json(BuildResponse {
        id,
        path: path.to_string_lossy().to_string(),
        size,
    }))
}

/// Download a configfile subtree as a JSON file
pub async fn export_configfile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tree = state.store.load_configfile_tree().await?;
    let exported = export_tree(&tree, id)?;
    let body = serde_json::to_string_pretty(&exported).map_err(|e| ApiError::internal(e.to_string()))?;

    let filename: String = exported
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_. ()".contains(c) { c } else { '_' })
        .collect();

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.json\"", filename),
            ),
        ],
        body,
    ))
}

/// Recreate an uploaded subtree
pub async fn import_configfiles(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportConfigfileRequest>,
) -> Result<(StatusCode, Json<ImportReport>), ApiError> {
    let _guard = state.import_lock.lock().await;

    let prov_dir = PathBuf::from(&state.config.prov_dir);
    let report = import_tree(&state.store, &state.compiler, &prov_dir, &req).await?;
    Ok(created(report))
}
