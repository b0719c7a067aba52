//! Permission record handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::auth::Identity;
use crate::path::{self, ROOT};
use crate::web::dto::{ApiResponse, PermissionEntry, PermissionsResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::CurrentIdentity;

async fn describe(
    state: &AppState,
    identity: &Identity,
    path: &str,
) -> Result<PermissionsResponse, ApiError> {
    let path = path::normalize(path);
    let records = state.files.get_permissions(identity, &path).await?;
    let effective = state.files.effective_permissions(identity, &path).await?;
    Ok(PermissionsResponse {
        path,
        effective,
        records,
    })
}

async fn replace(
    state: &AppState,
    identity: &Identity,
    path: &str,
    entries: Vec<PermissionEntry>,
) -> Result<PermissionsResponse, ApiError> {
    let path = path::normalize(path);
    let records = entries.into_iter().map(|e| e.into_record(&path)).collect();
    let records = state.files.set_permissions(identity, &path, records).await?;
    let effective = state.files.effective_permissions(identity, &path).await?;
    Ok(PermissionsResponse {
        path,
        effective,
        records,
    })
}

/// GET /permissions - Records on the root.
pub async fn get_root_permissions(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<ApiResponse<PermissionsResponse>>, ApiError> {
    Ok(Json(ApiResponse::new(describe(&state, &identity, ROOT).await?)))
}

/// GET /permissions/*path - Records attached to exactly this path.
pub async fn get_permissions(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<PermissionsResponse>>, ApiError> {
    Ok(Json(ApiResponse::new(describe(&state, &identity, &path).await?)))
}

/// PUT /permissions - Replace the records on the root.
pub async fn put_root_permissions(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(entries): Json<Vec<PermissionEntry>>,
) -> Result<Json<ApiResponse<PermissionsResponse>>, ApiError> {
    Ok(Json(ApiResponse::new(
        replace(&state, &identity, ROOT, entries).await?,
    )))
}

/// PUT /permissions/*path - Replace the records attached to this path.
pub async fn put_permissions(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    Json(entries): Json<Vec<PermissionEntry>>,
) -> Result<Json<ApiResponse<PermissionsResponse>>, ApiError> {
    Ok(Json(ApiResponse::new(
        replace(&state, &identity, &path, entries).await?,
    )))
}
