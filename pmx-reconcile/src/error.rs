//! Error types for metadata reconciliation

use crate::model::EntryId;
use thiserror::Error;

/// Errors raised by merge steps.
///
/// Disagreement between sources is *not* an error; it is recorded as a
/// conflict in the [`MergeContext`](crate::context::MergeContext). These
/// variants signal upstream extraction defects that stop resolution of a
/// single field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    /// An entry under a datetime key carries a non-timestamp value
    #[error("Type violation in field '{field}': entry {entry_id} under key '{key}' is not a timestamp")]
    TypeViolation {
        field: String,
        key: String,
        entry_id: EntryId,
    },

    /// Step configuration is unusable (e.g. empty key list)
    #[error("Invalid step configuration: {0}")]
    InvalidConfig(String),
}

impl MergeError {
    /// Field the error applies to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            MergeError::TypeViolation { field, .. } => Some(field),
            MergeError::InvalidConfig(_) => None,
        }
    }
}

/// Result type for merge steps
pub type MergeResult<T> = std::result::Result<T, MergeError>;
