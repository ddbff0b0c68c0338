//! Error taxonomy shared by the record store, tool layer, and agent.
//!
//! Every failure that can reach the language model is one of four kinds.
//! The tool layer turns them into structured payloads using [`DiveLogError::code`]
//! so the agent can explain the problem conversationally; only
//! [`DiveLogError::UpstreamModel`] escapes to the interactive loop.

use thiserror::Error;

/// Domain error for dive log operations.
#[derive(Debug, Error)]
pub enum DiveLogError {
    /// A required field is missing or a value is malformed.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The SQLite database could not be opened, read, or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The hosted model (chat or embeddings) failed or returned unusable output.
    #[error("language model error: {0}")]
    UpstreamModel(String),
}

impl DiveLogError {
    /// Stable machine-readable code used in tool failure payloads.
    pub fn code(&self) -> &'static str {
        match self {
            DiveLogError::Validation(_) => "validation_error",
            DiveLogError::NotFound(_) => "not_found",
            DiveLogError::StorageUnavailable(_) => "storage_unavailable",
            DiveLogError::UpstreamModel(_) => "upstream_model_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DiveLogError::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        DiveLogError::UpstreamModel(message.into())
    }
}

impl From<sqlx::Error> for DiveLogError {
    fn from(err: sqlx::Error) -> Self {
        DiveLogError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for DiveLogError {
    fn from(err: std::io::Error) -> Self {
        DiveLogError::StorageUnavailable(err.to_string())
    }
}

/// Convenience alias for results carrying a [`DiveLogError`].
pub type DiveResult<T> = std::result::Result<T, DiveLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DiveLogError::validation("x").code(), "validation_error");
        assert_eq!(DiveLogError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            DiveLogError::StorageUnavailable("x".into()).code(),
            "storage_unavailable"
        );
        assert_eq!(DiveLogError::upstream("x").code(), "upstream_model_error");
    }

    #[test]
    fn test_sqlx_errors_map_to_storage_unavailable() {
        let err: DiveLogError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DiveLogError::StorageUnavailable(_)));
    }

    #[test]
    fn test_display_includes_message() {
        let err = DiveLogError::validation("site must not be empty");
        assert_eq!(err.to_string(), "invalid input: site must not be empty");
    }
}
