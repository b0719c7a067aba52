//! File handlers.

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::db::File;
use crate::file::{BatchReport, CreateRequest, Download, Listing, UpdateRequest, Upload};
use crate::path::ROOT;
use crate::storage::ObjectSource;
use crate::web::dto::{ApiResponse, DeleteBody, MoveBody, UpdateBody, UpdateQuery, UploadQuery};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::CurrentIdentity;
use crate::DriveError;

/// Largest JSON body accepted by the file endpoints.
const MAX_JSON_BODY: usize = 1024 * 1024;

/// Query string of `GET /files/*path`.
#[derive(Debug, Default, Deserialize)]
pub struct GetQuery {
    /// Send `Content-Disposition: attachment`.
    #[serde(default)]
    pub download: bool,
    /// List even when the path names a file.
    #[serde(default)]
    pub list: bool,
}

/// Generate a safe Content-Disposition header value.
///
/// Control characters are dropped, quotes and backslashes replaced, and
/// non-ASCII names get an RFC 5987 `filename*` parameter.
fn content_disposition_header(filename: &str, attachment: bool) -> String {
    let kind = if attachment { "attachment" } else { "inline" };
    let plain = filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("{kind}; filename=\"{filename}\"");
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();
    format!(
        "{kind}; filename=\"{sanitized}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn http_date(file: &File) -> String {
    file.updated_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub(crate) fn download_response(download: Download, attachment: bool) -> Result<Response, ApiError> {
    let Download { file, range, body } = download;

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, &file.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::LAST_MODIFIED, http_date(&file))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(file.name(), attachment),
        );
    let builder = match range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range())
            .header(header::CONTENT_LENGTH, range.len()),
        None => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, file.size.max(0)),
    };

    builder
        .body(Body::from_stream(ReaderStream::new(body)))
        .map_err(|e| {
            tracing::error!(path = %file.path, error = %e, "failed to build download response");
            ApiError::internal("failed to build response")
        })
}

pub(crate) fn range_header(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    headers
        .get(header::RANGE)
        .map(|v| {
            v.to_str().map_err(|_| {
                ApiError::from(DriveError::RangeNotSatisfiable(
                    "Range header is not valid ASCII".to_string(),
                ))
            })
        })
        .transpose()
}

fn content_length(headers: &HeaderMap) -> Result<u64, ApiError> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::bad_request("a valid Content-Length header is required"))
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Stream a request body into the object store without buffering it.
fn body_reader(body: Body) -> ObjectSource {
    let stream = body.into_data_stream().map_err(io::Error::other);
    Box::new(StreamReader::new(stream))
}

fn upload_from(headers: &HeaderMap, body: Body) -> Result<Upload, ApiError> {
    Ok(Upload::new(content_length(headers)?, content_type(headers), body_reader(body)))
}

/// Parse an optional JSON body; an empty body yields the default.
async fn read_json<T: DeserializeOwned + Default>(body: Body) -> Result<T, ApiError> {
    let bytes = axum::body::to_bytes(body, MAX_JSON_BODY)
        .await
        .map_err(|e| ApiError::bad_request(format!("could not read body: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

fn batch_response(report: BatchReport) -> Response {
    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(ApiResponse::new(report))).into_response()
}

/// GET /files - List the root.
pub async fn list_root(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<ApiResponse<Listing>>, ApiError> {
    let listing = state.files.list(&identity, ROOT).await?;
    Ok(Json(ApiResponse::new(listing)))
}

/// GET/HEAD /files/*path - Download a file or list a directory.
///
/// A `Range` header on a file yields 206 with `Content-Range`, or 416 when
/// it cannot be satisfied.
pub async fn get_path(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    Query(query): Query<GetQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !query.list {
        let range = range_header(&headers)?;
        match state.files.download(&identity, &path, range).await {
            Ok(download) => return download_response(download, query.download),
            // Not a readable file; the listing decides between a directory,
            // a denial and a missing path.
            Err(DriveError::FileNotFound(_) | DriveError::Unauthorized { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let listing = state.files.list(&identity, &path).await?;
    Ok(Json(ApiResponse::new(listing)).into_response())
}

/// PUT /files/*path - Upload a file.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<ApiResponse<File>>), ApiError> {
    let upload = upload_from(&headers, body)?;
    let request = CreateRequest::new(path, upload)
        .with_description(query.description.unwrap_or_default())
        .with_overwrite(query.overwrite);

    let file = state.files.create(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(file))))
}

/// PATCH /files/*path - Edit metadata, rename, or replace content.
///
/// With `?replace=true` the body is the new content and metadata comes from
/// the query string; otherwise the body is an optional JSON [`UpdateBody`].
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    Query(query): Query<UpdateQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ApiResponse<File>>, ApiError> {
    let request = if query.replace {
        UpdateRequest {
            new_path: query.new_path,
            description: query.description,
            content: Some(upload_from(&headers, body)?),
        }
    } else {
        let patch: UpdateBody = read_json(body).await?;
        UpdateRequest {
            new_path: patch.new_path.or(query.new_path),
            description: patch.description.or(query.description),
            content: None,
        }
    };

    let file = state.files.update(&identity, &path, request).await?;
    Ok(Json(ApiResponse::new(file)))
}

/// POST /files/*path - Move a file or directory.
///
/// Responds 207 when a directory move skipped some files.
pub async fn move_path(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    Json(body): Json<MoveBody>,
) -> Result<Response, ApiError> {
    let report = state
        .files
        .move_path(&identity, &path, &body.destination, body.names.as_deref())
        .await?;
    Ok(batch_response(report))
}

/// DELETE /files - Delete named entries of the root.
pub async fn delete_root(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    body: Body,
) -> Result<Response, ApiError> {
    let body: DeleteBody = read_json(body).await?;
    let report = state
        .files
        .delete_path(&identity, ROOT, body.names.as_deref())
        .await?;
    Ok(batch_response(report))
}

/// DELETE /files/*path - Delete a file or directory.
///
/// Responds 207 when a directory delete skipped some files.
pub async fn delete_path(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(path): Path<String>,
    body: Body,
) -> Result<Response, ApiError> {
    let body: DeleteBody = read_json(body).await?;
    let report = state
        .files
        .delete_path(&identity, &path, body.names.as_deref())
        .await?;
    Ok(batch_response(report))
}
