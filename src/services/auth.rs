//! Credential to owner resolution.
//!
//! Real deployments plug in their identity provider; the bundled validator
//! treats the bearer token itself as the owner id, which is enough for
//! development and tests.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn resolve_owner_id(&self, credential: &str) -> Result<Uuid, AuthError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BearerOwnerValidator;

#[async_trait]
impl TokenValidator for BearerOwnerValidator {
    async fn resolve_owner_id(&self, credential: &str) -> Result<Uuid, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        Uuid::try_parse(credential).map_err(|_| AuthError::Invalid)
    }
}
