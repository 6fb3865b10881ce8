//! Error types for the authorization engine

use thiserror::Error;
use uuid::Uuid;

/// Authorization engine errors.
///
/// "Access denied" is deliberately absent: a denial is an ordinary
/// [`Decision`](crate::types::Decision) value, never an error. The variants
/// here are operational or configuration failures.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Unknown resource identifier — a catalog/setup defect, not a deny
    #[error("unknown resource identifier: {0}")]
    UnknownResource(Uuid),

    /// Unknown action identifier — a catalog/setup defect, not a deny
    #[error("unknown action identifier: {0}")]
    UnknownAction(Uuid),

    /// Unknown role identifier
    #[error("unknown role identifier: {0}")]
    UnknownRole(Uuid),

    /// Permission rule not found
    #[error("permission rule not found: {0}")]
    RuleNotFound(Uuid),

    /// Malformed condition or rule payload, rejected at write time
    #[error("validation failed: {0}")]
    Validation(String),

    /// Audit purge attempted by an actor failing the retention predicate
    #[error("audit retention purge forbidden: {0}")]
    RetentionForbidden(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// True for the catalog-defect variants that are surfaced to operators
    /// rather than end users.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownResource(_) | Self::UnknownAction(_) | Self::UnknownRole(_)
        )
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
