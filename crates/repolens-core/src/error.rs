use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoLensError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("repository fetch failed: {0}")]
    FetchFailed(String),

    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("embedding failed: {0}")]
    EmbedFailed(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("vector index not ready: {0}")]
    IndexNotReady(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RepoLensError {
    /// Stable kind name used in wire responses and job records.
    pub fn kind(&self) -> &'static str {
        match self {
            RepoLensError::InvalidInput(_) => "InvalidInput",
            RepoLensError::FetchFailed(_) => "FetchFailed",
            RepoLensError::ParseFailed(_) => "ParseFailed",
            RepoLensError::EmbedFailed(_) => "EmbedFailed",
            RepoLensError::IndexUnavailable(_) => "IndexUnavailable",
            RepoLensError::IndexNotReady(_) => "IndexNotReady",
            RepoLensError::Timeout(_) => "Timeout",
            RepoLensError::NotFound(_) => "NotFound",
            RepoLensError::Io(_) | RepoLensError::Serialization(_) | RepoLensError::Internal(_) => {
                "Internal"
            }
        }
    }

    /// Whether a higher layer should retry with back-off.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepoLensError::IndexUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RepoLensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(RepoLensError::InvalidInput("x".into()).kind(), "InvalidInput");
        assert_eq!(RepoLensError::Timeout("x".into()).kind(), "Timeout");
        let io = RepoLensError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), "Internal");
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(RepoLensError::IndexUnavailable("refused".into()).is_retryable());
        assert!(!RepoLensError::IndexNotReady("building".into()).is_retryable());
        assert!(!RepoLensError::ParseFailed("x".into()).is_retryable());
    }
}
