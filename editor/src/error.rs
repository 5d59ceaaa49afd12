use thiserror::Error;

/// Failure of the client-resident draft store
#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("draft storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored draft is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failure of the durable post store.
///
/// Surfaced to the editor as a status, never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("post not found")]
    NotFound,
    #[error("server rejected the save ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("auto-save is closed")]
    Closed,
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Local(#[from] LocalStoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
