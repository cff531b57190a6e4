//! HTTP handlers for resumable downloads.

use crate::{
    errors::AppError,
    handlers::owner::Owner,
    models::session::DownloadSession,
    services::{
        download_service::DownloadTarget, ranges::parse_range, storage_service::StorageService,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `GET|POST /download/resumable`. Exactly one field is expected;
/// `file_id` wins when both are present.
#[derive(Debug, Deserialize)]
pub struct InitDownloadReq {
    #[serde(alias = "filePath")]
    pub file_path: Option<String>,
    #[serde(alias = "fileID", alias = "fileId")]
    pub file_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InitDownloadResp {
    pub session_id: Uuid,
    pub file_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub checksum: String,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
}

/// `GET|POST /download/resumable`
pub async fn init_download(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Json(req): Json<InitDownloadReq>,
) -> Result<impl IntoResponse, AppError> {
    let target = match (req.file_id, req.file_path) {
        (Some(id), _) => DownloadTarget::Id(id),
        (None, Some(path)) => DownloadTarget::Path(path),
        (None, None) => return Err(AppError::bad_request("file_id or file_path is required")),
    };

    let session = service.downloads.init_download(owner_id, target).await?;
    Ok((
        StatusCode::CREATED,
        Json(InitDownloadResp {
            session_id: session.session_id,
            file_id: session.file_id,
            file_name: session.display_name,
            file_size: session.size,
            checksum: session.sha256,
            mime_type: session.mime_type,
            expires_at: session.expires_at,
        }),
    ))
}

/// `GET /download/resumable/{session_id}` with `Range: bytes=s-e`.
///
/// Without a `Range` header the first chunk (up to the chunk limit) is
/// served. 206 for a partial range, 200 for the range that reaches the
/// last byte. A 0-byte object answers 200 with `Content-Range: bytes */0`.
pub async fn download_chunk(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = service.downloads.session(owner_id, session_id)?;
    if session.size == 0 {
        // No byte to address; any Range is moot.
        let chunk = service
            .downloads
            .fetch_empty(owner_id, session_id)
            .map_err(AppError::from_download)?;
        return Ok(chunk_response(StatusCode::OK, chunk.data, "bytes */0", &session));
    }
    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::new(StatusCode::RANGE_NOT_SATISFIABLE, "invalid Range header"))?;
            parse_range(value, session.size).map_err(AppError::from_download)?
        }
        None => {
            let last = session
                .size
                .min(service.limits.max_chunk_bytes)
                .saturating_sub(1);
            parse_range(&format!("bytes=0-{last}"), session.size)
                .map_err(AppError::from_download)?
        }
    };

    let chunk = service
        .downloads
        .fetch_chunk(owner_id, session_id, range.start, range.end)
        .await
        .map_err(AppError::from_download)?;

    let status = if chunk.complete {
        StatusCode::OK
    } else {
        StatusCode::PARTIAL_CONTENT
    };
    let content_range = format!("bytes {}-{}/{}", chunk.start, chunk.end, chunk.size);
    Ok(chunk_response(status, chunk.data, &content_range, &session))
}

fn chunk_response(
    status: StatusCode,
    data: Bytes,
    content_range: &str,
    session: &DownloadSession,
) -> Response {
    let length = data.len();
    let mut response = Response::new(Body::from(data));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&session.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(content_range) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", session.sha256)) {
        headers.insert(header::ETAG, value);
    }
    response
}

/// `DELETE /download/resumable/{session_id}`
pub async fn abort_download(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    service.downloads.abort(owner_id, session_id);
    StatusCode::NO_CONTENT
}
