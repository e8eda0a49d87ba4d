//! Streaming call framing over composable byte pipes.
//!
//! callpipe marshals named calls with up to eight tagged arguments into
//! length-prefixed frames, and carries them over a graph of buffering,
//! fan-out pipe nodes that reassemble frames across arbitrary chunk
//! boundaries.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte endpoints with ready-read and closed notifications
//! - [`frame`]: the call codec, tagged values and blocking reader/writer
//! - [`pipe`]: pipe nodes, the delegate/line/stdio adapters and `CallChannel`

/// Re-export transport types.
pub mod transport {
    pub use callpipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use callpipe_frame::*;
}

/// Re-export pipe types.
pub mod pipe {
    pub use callpipe_pipe::*;
}
