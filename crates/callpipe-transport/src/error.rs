/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed and no longer accepts reads or writes.
    #[error("transport closed")]
    Closed,

    /// The background reader thread could not be started.
    #[error("failed to start reader thread: {0}")]
    ReaderThread(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
