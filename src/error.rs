use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("initialization failed")]
    InitFailed,

    #[error("allocation failed")]
    AllocationFailed,

    #[error("operation invalid in current state")]
    BadState,

    #[error("invalid message")]
    InvalidMessage,

    #[error("buffer not large enough")]
    BufferNotEnough,

    #[error("not found")]
    NotFound,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}
