//! Error types for the transport operator

use thiserror::Error;

/// Errors raised while provisioning or publishing the transport
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Optimistic-concurrency conflict while writing an external resource
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid MulticlusterGlobalHub spec
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Bounded wait exceeded
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    FinalizerError(String),
}

/// Result type for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Transient failures are worth retrying quickly; configuration and
    /// validation failures repeat until someone fixes the input.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::Conflict(_) | Error::Timeout(_)
        )
    }

    /// True when the error is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(e)) if e.code == 404)
    }
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(err: kube::runtime::finalizer::Error<Error>) -> Self {
        match err {
            kube::runtime::finalizer::Error::ApplyFailed(e)
            | kube::runtime::finalizer::Error::CleanupFailed(e) => e,
            other => Error::FinalizerError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_errors() {
        assert!(Error::Timeout("kafka".to_string()).is_retriable());
        assert!(Error::Conflict("kafka-user".to_string()).is_retriable());
        assert!(!Error::ConfigError("missing key".to_string()).is_retriable());
        assert!(!Error::ValidationError("replicas".to_string()).is_retriable());
    }

    #[test]
    fn test_not_found_detection() {
        let err = Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "kafkas.kafka.strimzi.io \"kafka\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(err.is_not_found());
        assert!(!Error::Timeout("x".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ConfigError("secret has no bootstrap_server".to_string());
        assert!(err.to_string().contains("bootstrap_server"));
    }
}
