//! Error handling for the service

use thiserror::Error;

/// Result type alias for the service
pub type Result<T> = std::result::Result<T, RagError>;

/// Main error type, one variant per failure kind surfaced to callers
#[derive(Error, Debug)]
pub enum RagError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("permission denied: missing '{action}' on collection")]
    PermissionDenied { action: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("document with the same source hash already exists")]
    DuplicateDocument,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        RagError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn permission_denied(action: impl ToString) -> Self {
        RagError::PermissionDenied {
            action: action.to_string(),
        }
    }

    /// Check if the error is transient and safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Unavailable(_) | RagError::Upstream(_))
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            RagError::NotFound { .. } => "not_found",
            RagError::PermissionDenied { .. } => "permission_denied",
            RagError::Validation(_) => "validation",
            RagError::DuplicateDocument => "duplicate_document",
            RagError::Upstream(_) => "upstream",
            RagError::Unavailable(_) => "unavailable",
            RagError::Internal(_) => "internal",
        }
    }

    /// Whether the underlying cause is a unique-constraint violation.
    ///
    /// Used by the ingestion retry loop: two concurrent ingests of the same
    /// content race on the live source-hash index, and the loser re-runs the
    /// dedup probe instead of surfacing the conflict.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RagError::Internal(err) => err
                .downcast_ref::<sqlx::Error>()
                .and_then(|e| e.as_database_error())
                .map(|db| db.is_unique_violation())
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                RagError::Unavailable("database connection pool exhausted".to_string())
            }
            sqlx::Error::PoolClosed => {
                RagError::Unavailable("database connection pool closed".to_string())
            }
            sqlx::Error::Io(e) => RagError::Unavailable(format!("database unreachable: {}", e)),
            other => RagError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let unavailable = RagError::Unavailable("pool exhausted".to_string());
        assert!(unavailable.is_retryable());

        let validation = RagError::Validation("bad input".to_string());
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let not_found = RagError::not_found("Document", "abc");
        assert_eq!(not_found.category(), "not_found");

        let denied = RagError::permission_denied("write");
        assert_eq!(denied.category(), "permission_denied");
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        let err = RagError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, RagError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_message_names_resource() {
        let err = RagError::not_found("Collection", "1234");
        assert_eq!(err.to_string(), "Collection not found: 1234");
    }

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!RagError::DuplicateDocument.is_unique_violation());
        assert!(!RagError::Validation("x".into()).is_unique_violation());
    }
}
