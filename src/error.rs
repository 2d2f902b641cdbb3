use thiserror::Error;

/// Failure of an ephemeral store operation. Callers decide whether to
/// degrade (membership falls back to the repository, presence writes are
/// best-effort) or surface a handler error.
#[derive(Debug, Error)]
pub enum EphemeralError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("bad stored value: {0}")]
    BadValue(String),
}

/// Failure of a repository (durable store) operation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {operation}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("bad response body from {operation}: {detail}")]
    BadBody {
        operation: &'static str,
        detail: String,
    },
}

/// Handler-level error. The variant decides the policy: authentication
/// failures close the connection, everything else becomes an `error` event
/// to the originating socket.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Ephemeral(#[from] EphemeralError),
}

impl HubError {
    /// Message carried by the `error` event emitted to the originator.
    pub fn client_message(&self) -> String {
        match self {
            HubError::Repository(_) | HubError::Ephemeral(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}
