//! Resumable file storage: sandboxed content store, metadata reconciliation
//! and chunked upload/download sessions behind an axum API.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
