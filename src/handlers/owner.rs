//! Resolves the caller's owner id from `Authorization: Bearer <token>`.

use crate::{
    errors::AppError,
    services::{auth::AuthError, storage_service::StorageService},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

/// The authenticated owner of the current request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner(pub Uuid);

impl FromRequestParts<StorageService> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &StorageService,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .ok_or(AuthError::Invalid)?;
        let owner_id = state.tokens.resolve_owner_id(token).await?;
        Ok(Owner(owner_id))
    }
}
