use callpipe_frame::FrameError;
use callpipe_transport::TransportError;

/// Errors that can occur in pipe operations.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encoding or decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The sink link would make delivery loop back to its source.
    #[error("sink link would form a cycle")]
    Cycle,

    /// The transport is already bound to another pipe node.
    #[error("transport {0} is bound to another pipe node")]
    TransportInUse(u64),

    /// The pipe stopped accepting bytes before a whole frame was written.
    #[error("pipe stalled after {written} of {total} bytes")]
    Stalled { written: usize, total: usize },

    /// I/O error on a standard stream.
    #[error("pipe I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipeError>;
