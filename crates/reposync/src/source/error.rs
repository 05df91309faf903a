//! Source provider error types.

use thiserror::Error;

/// Errors returned by a source provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The repository has no commits or branches yet.
    #[error("Repository is empty")]
    EmptyRepository,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source network error: {0}")]
    Network(String),

    #[error("Source request timed out after {0}s")]
    Timeout(u64),

    #[error("Source rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Source API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SourceError {
    /// Returns true if the error is likely transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::Timeout(_) | SourceError::RateLimited { .. } => {
                true
            }
            SourceError::Api { status, .. } => *status >= 500,
            SourceError::EmptyRepository | SourceError::NotFound(_) => false,
        }
    }

    /// Returns true when the provider reported a repository without commits.
    pub fn is_empty_repository(&self) -> bool {
        matches!(self, SourceError::EmptyRepository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(SourceError::Network("reset".into()).is_retryable());
        assert!(SourceError::Timeout(30).is_retryable());
        assert!(SourceError::RateLimited {
            retry_after_secs: 60
        }
        .is_retryable());
        assert!(SourceError::Api {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());

        assert!(!SourceError::Api {
            status: 403,
            message: "forbidden".into()
        }
        .is_retryable());
        assert!(!SourceError::NotFound("x".into()).is_retryable());
        assert!(!SourceError::EmptyRepository.is_retryable());
    }

    #[test]
    fn test_is_empty_repository() {
        assert!(SourceError::EmptyRepository.is_empty_repository());
        assert!(!SourceError::NotFound("main".into()).is_empty_repository());
    }
}
