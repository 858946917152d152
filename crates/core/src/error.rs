use thiserror::Error;

/// Result type used across Elevara crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
///
/// The core never recovers from any of these locally, with two exceptions:
/// the binding mutator retries [`AppError::Conflict`] a bounded number of
/// times, and the asset-inventory repository retries transient
/// [`AppError::QuotaExceeded`] group lookups. Everything else propagates to
/// the embedding layer unmodified.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller credential absent or invalid.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Caller lacks the IAM permission for a specific operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Target entity does not exist.
    #[error("not found: {0}")]
    ResourceNotFound(String),

    /// A collaborator API quota was exhausted; backoff-eligible.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The fan-out executor is oversubscribed; backoff-eligible.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Malformed or policy-violating input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Signature, audience, or expiry failure while verifying a token.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A structurally equal binding already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The requested capability has no configured collaborator.
    #[error("feature not available: {0}")]
    FeatureNotAvailable(String),

    /// A conditional write lost against a concurrent modification.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Conditional-write retries were exhausted without success.
    #[error("conflict retries exhausted: {0}")]
    ConflictRetryExhausted(String),

    /// A long-running platform operation did not finish; caller may retry.
    #[error("incomplete operation: {0}")]
    IncompleteOperation(String),

    /// The operation is not supported by this collaborator variant.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether a caller may reasonably retry the failed operation.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded(_)
                | Self::ResourceExhausted(_)
                | Self::Conflict(_)
                | Self::IncompleteOperation(_)
        )
    }
}
