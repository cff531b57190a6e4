//! Core data models for the file storage service.
//!
//! Object records map to the metadata table via `sqlx::FromRow`; sessions
//! are in-memory only. Everything serializes as JSON via `serde`.

pub mod object;
pub mod session;
