//! On-disk naming convention `{id}_{display_name}`.
//!
//! The physical file name carries the object's identity, so a directory
//! listing alone is enough to find a file again when the metadata store has
//! lost track of it.

use crate::models::object::ObjectIdentity;
use thiserror::Error;
use uuid::Uuid;

const SEPARATOR: char = '_';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("`{0}` is not an encoded object name")]
    NotEncoded(String),
    #[error("display name `{0}` is not allowed")]
    InvalidDisplayName(String),
}

/// A display name must be a single path segment.
pub fn validate_display_name(display_name: &str) -> Result<(), NamingError> {
    if display_name.is_empty()
        || display_name == "."
        || display_name == ".."
        || display_name.contains(['/', '\\', '\0'])
    {
        return Err(NamingError::InvalidDisplayName(display_name.to_string()));
    }
    Ok(())
}

/// Physical file name for an object.
pub fn encode(id: Uuid, display_name: &str) -> Result<String, NamingError> {
    validate_display_name(display_name)?;
    Ok(format!("{}{}{}", id.hyphenated(), SEPARATOR, display_name))
}

/// Split a physical file name back into identity and display name.
///
/// Splits once on the first `_`; the left side must parse as an identifier.
/// Callers walking a directory should skip entries that fail here rather
/// than abort the listing.
pub fn decode(file_name: &str) -> Result<ObjectIdentity, NamingError> {
    let not_encoded = || NamingError::NotEncoded(file_name.to_string());
    let (id, display_name) = file_name.split_once(SEPARATOR).ok_or_else(not_encoded)?;
    let id = Uuid::try_parse(id).map_err(|_| not_encoded())?;
    if display_name.is_empty() {
        return Err(not_encoded());
    }
    Ok(ObjectIdentity {
        id,
        display_name: display_name.to_string(),
    })
}
