//! Share handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};

use super::file::{download_response, range_header};
use crate::db::Share;
use crate::file::SharedFiles;
use crate::web::dto::{ApiResponse, CreateShareBody};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::CurrentIdentity;

/// POST /shares - Issue a share.
pub async fn create_share(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<CreateShareBody>,
) -> Result<(StatusCode, Json<ApiResponse<Share>>), ApiError> {
    let share = state
        .files
        .create_share(&identity, &body.path, body.permissions)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(share))))
}

/// GET /shares - Shares issued by the caller.
pub async fn list_shares(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<ApiResponse<Vec<Share>>>, ApiError> {
    let shares = state.files.list_shares(&identity).await?;
    Ok(Json(ApiResponse::new(shares)))
}

/// GET /shares/:id - Open a share. No session needed.
pub async fn open_share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SharedFiles>>, ApiError> {
    let shared = state.files.open_share(&id).await?;
    Ok(Json(ApiResponse::new(shared)))
}

/// GET /shares/:id/files/*path - Download a file through a share.
pub async fn download_shared(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = range_header(&headers)?;
    let download = state.files.download_shared(&id, &path, range).await?;
    download_response(download, true)
}

/// DELETE /shares/:id - Revoke a share.
pub async fn delete_share(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.files.delete_share(&identity, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
