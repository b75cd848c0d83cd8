//! Error types for the Samtest operator.

use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The owner has no uid, so no owner reference can point at it.
    #[error("Cannot set owner reference: {kind} {namespace}/{name} has no uid")]
    MissingOwnerUid {
        /// Owner kind.
        kind: String,
        /// Owner name.
        name: String,
        /// Owner namespace.
        namespace: String,
    },

    /// A sub-reconcile task panicked or was cancelled.
    #[error("Reconcile task did not complete: {0}")]
    TaskJoin(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// HTTP status code of the underlying API error, if any.
    pub fn api_code(&self) -> Option<u16> {
        match self {
            OperatorError::KubeError(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// Whether this is an optimistic concurrency conflict (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> OperatorError {
        OperatorError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "Conflict".into(),
            code,
        }))
    }

    #[test]
    fn conflict_detection() {
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_conflict());
        assert!(!OperatorError::InvalidConfig("x".into()).is_conflict());
    }

    #[test]
    fn missing_owner_uid_display() {
        let err = OperatorError::MissingOwnerUid {
            kind: "Samtest".into(),
            name: "sample".into(),
            namespace: "default".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot set owner reference: Samtest default/sample has no uid"
        );
        assert_eq!(err.api_code(), None);
    }
}
