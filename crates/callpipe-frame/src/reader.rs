use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::call::Call;
use crate::codec::{CodecConfig, Decoded, FrameCodec};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete calls from any blocking `Read` stream.
///
/// Handles partial reads internally and skips no-op frames. For event-driven
/// links use a pipe node with a call channel instead.
pub struct CallReader<T> {
    inner: T,
    buf: BytesMut,
    codec: FrameCodec,
}

impl<T: Read> CallReader<T> {
    /// Create a new call reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new call reader with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: FrameCodec::new(config),
        }
    }

    /// Read the next call (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, and
    /// `Ok(None)` only if EOF falls exactly on a frame boundary.
    pub fn read_call(&mut self) -> Result<Option<Call>> {
        loop {
            match self.codec.deserialize(&mut self.buf)? {
                Decoded::Call(call) => return Ok(Some(call)),
                Decoded::NoOp => continue,
                Decoded::Incomplete => {}
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current codec.
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}
