//! Authentication error types.
//!
//! Rejections carry an OAuth error code and a human-readable description.
//! Infrastructure failures keep their detail for logs only; the HTTP
//! rendering in [`crate::middleware`] replaces it with a generic message.

use std::fmt;

use keygate_cache::CacheError;
use keygate_storage::StorageError;

/// Errors that can occur while resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The bearer token is unknown, undecodable or expired.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The client application is unknown, suspended or its secret mismatches.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The client credentials are malformed.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The entity store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The cache layer failed, including lock timeouts.
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache error.
        message: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// OAuth error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken { .. } => "invalid_token",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::Storage { .. } | Self::Cache { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns `true` for client-caused rejections (as opposed to failures).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::InvalidClient { .. } | Self::InvalidGrant { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> AuthErrorCategory {
        if self.is_rejection() {
            AuthErrorCategory::Rejected
        } else {
            AuthErrorCategory::Infrastructure
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(err) => err.into(),
            other => Self::Cache {
                message: other.to_string(),
            },
        }
    }
}

/// Categories of auth errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCategory {
    /// The caller presented bad credentials.
    Rejected,
    /// A backing service failed.
    Infrastructure,
}

impl fmt::Display for AuthErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// Type alias for auth results.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::invalid_token("x").error_code(), "invalid_token");
        assert_eq!(AuthError::invalid_client("x").error_code(), "invalid_client");
        assert_eq!(AuthError::invalid_grant("x").error_code(), "invalid_grant");
        assert_eq!(AuthError::internal("x").error_code(), "server_error");
    }

    #[test]
    fn test_cache_errors_keep_storage_origin() {
        let err: AuthError = CacheError::from(StorageError::connection_error("down")).into();
        assert!(matches!(err, AuthError::Storage { .. }));

        let err: AuthError = CacheError::lock_timeout("lock:tokens:1").into();
        assert!(matches!(err, AuthError::Cache { .. }));
        assert_eq!(err.category(), AuthErrorCategory::Infrastructure);
    }
}
