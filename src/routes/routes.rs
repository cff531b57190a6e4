//! Defines routes for resumable transfers.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST   /upload/resumable` — open a session for a display path
//!   - `GET    /upload/resumable/{session_id}` — ranges received so far
//!   - `PATCH  /upload/resumable/{session_id}` — write one chunk (`Content-Range`)
//!   - `DELETE /upload/resumable/{session_id}` — abort and drop staged bytes
//!
//! - **Downloads**
//!   - `GET|POST /download/resumable` — open a session by `file_id` or `file_path`
//!   - `GET    /download/resumable/{session_id}` — read one chunk (`Range`)
//!   - `DELETE /download/resumable/{session_id}` — abort
//!
//! Everything except the health probes requires `Authorization: Bearer`.

use crate::{
    handlers::{
        download_handlers::{abort_download, download_chunk, init_download},
        health_handlers::{healthz, readyz},
        upload_handlers::{abort_upload, init_upload, upload_chunk, upload_status},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router carrying `StorageService` as shared state.
pub fn routes() -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/upload/resumable", post(init_upload))
        .route(
            "/upload/resumable/{session_id}",
            get(upload_status).patch(upload_chunk).delete(abort_upload),
        )
        .route(
            "/download/resumable",
            get(init_download).post(init_download),
        )
        .route(
            "/download/resumable/{session_id}",
            get(download_chunk).delete(abort_download),
        )
}
