use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("segment is full")]
    Full,

    #[error("request queue is full")]
    Backpressure,

    #[error("deadline exceeded")]
    Timeout,

    #[error("configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// True for errors caused by the caller rather than the broker.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BrokerError::InvalidArgument(_)
                | BrokerError::NotFound(_)
                | BrokerError::AlreadyExists(_)
        )
    }
}
