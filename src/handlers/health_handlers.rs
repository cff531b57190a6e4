//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, never touches storage
//! - GET /readyz   -> pings the metadata store and probes the content root

use crate::services::{metadata::with_timeout, storage_service::StorageService};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 200 when the metadata store answers within its deadline and a scratch
/// file can be written, read back and removed under the storage root;
/// 503 otherwise, with one entry per check.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let metadata_check = match with_timeout(
        service.limits.metadata_timeout,
        service.metadata.ping(),
    )
    .await
    {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(e.to_string()),
    };

    let probe = service.base_path().join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&probe, b"readyz").await {
        Ok(()) => {
            let read_back = fs::read(&probe).await;
            let removed = fs::remove_file(&probe).await;
            match (read_back, removed) {
                (Ok(bytes), Ok(())) if bytes == b"readyz" => CheckStatus::ok(),
                (Ok(_), Ok(())) => CheckStatus::failed("probe content mismatch".into()),
                (Err(e), _) => CheckStatus::failed(format!("could not read probe: {}", e)),
                (Ok(_), Err(e)) => CheckStatus::failed(format!("could not remove probe: {}", e)),
            }
        }
        Err(e) => CheckStatus::failed(format!("could not write probe: {}", e)),
    };

    let overall_ok = metadata_check.ok && disk_check.ok;
    let mut checks = BTreeMap::new();
    checks.insert("metadata", metadata_check);
    checks.insert("disk", disk_check);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        active_uploads: service.uploads.active_sessions(),
        active_downloads: service.downloads.active_sessions(),
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    active_uploads: usize,
    active_downloads: usize,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
