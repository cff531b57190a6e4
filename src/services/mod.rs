//! Storage and reconciliation layer.

pub mod auth;
pub mod content_store;
pub mod download_service;
pub mod error;
pub mod folders;
pub mod metadata;
pub mod naming;
pub mod ranges;
pub mod reconciler;
pub mod sandbox;
pub mod session_store;
pub mod storage_service;
pub mod upload_service;
