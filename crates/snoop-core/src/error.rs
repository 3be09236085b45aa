use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read body: {0}")]
    Body(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("backend answered with status {0}")]
    Status(u16),
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("no backends configured for endpoint {0}")]
    NoBackends(String),
    #[error("request cancelled")]
    Cancelled,
}
