use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("expected service not found: {0}")]
    ServiceNotFound(String),
    #[error("subscription lost: {0}")]
    SubscriptionLost(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
