//! HTTP handlers for resumable uploads.
//! Chunk bodies are streamed straight to the staging file at their offset.

use crate::{
    errors::AppError,
    handlers::owner::Owner,
    services::{
        ranges::parse_content_range,
        storage_service::StorageService,
        upload_service::{ChunkOutcome, InitUpload},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use uuid::Uuid;

/// Body of `POST /upload/resumable`.
#[derive(Debug, Deserialize)]
pub struct InitUploadReq {
    /// Display path of the finished file, e.g. `Documents/report.pdf`.
    pub path: String,
    pub size: u64,
    /// Hex SHA-256 of the whole object.
    pub checksum: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitUploadResp {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChunkAcceptedResp {
    pub session_id: Uuid,
    pub received_bytes: u64,
}

/// `POST /upload/resumable`
pub async fn init_upload(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Json(req): Json<InitUploadReq>,
) -> Result<impl IntoResponse, AppError> {
    let session = service
        .uploads
        .init_upload(InitUpload {
            owner_id,
            path: req.path,
            declared_size: req.size,
            expected_checksum: req.checksum,
            mime_type: req.mime_type,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitUploadResp {
            session_id: session.session_id,
        }),
    ))
}

/// `PATCH /upload/resumable/{session_id}` with `Content-Range: bytes s-e/t`.
///
/// 202 while bytes are missing, 200 with the created object once complete.
pub async fn upload_chunk(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let content_range = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("missing Content-Range header"))?;
    let range = parse_content_range(content_range)?;

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    let outcome = service
        .uploads
        .write_chunk_stream(owner_id, session_id, range, stream)
        .await?;

    let response = match outcome {
        ChunkOutcome::Partial { received } => (
            StatusCode::ACCEPTED,
            Json(ChunkAcceptedResp {
                session_id,
                received_bytes: received,
            }),
        )
            .into_response(),
        ChunkOutcome::Complete(record) => (StatusCode::OK, Json(record)).into_response(),
    };
    Ok(response)
}

/// `GET /upload/resumable/{session_id}`: ranges received so far.
pub async fn upload_status(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let status = service.uploads.status(owner_id, session_id).await?;
    Ok(Json(status))
}

/// `DELETE /upload/resumable/{session_id}`
pub async fn abort_upload(
    State(service): State<StorageService>,
    Owner(owner_id): Owner,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    service.uploads.abort(owner_id, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
