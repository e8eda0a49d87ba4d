use bytes::BytesMut;
use callpipe_frame::{can_deserialize, Call, CodecConfig, Decoded, FrameCodec, Value};
use tracing::{debug, warn};

use crate::error::{PipeError, Result};
use crate::traits::Pipe;

/// Decodes calls out of a pipe's buffer and writes calls to the pipe.
///
/// The channel owns no bytes itself: inbound frames accumulate in the pipe
/// node's buffer as chunks arrive, and [`drain`](CallChannel::drain) pulls
/// every complete frame out of it.
#[derive(Debug)]
pub struct CallChannel<P> {
    pipe: P,
    codec: FrameCodec,
}

impl<P: Pipe> CallChannel<P> {
    pub fn new(pipe: P) -> Self {
        Self::with_config(pipe, CodecConfig::default())
    }

    pub fn with_config(pipe: P, config: CodecConfig) -> Self {
        Self {
            pipe,
            codec: FrameCodec::new(config),
        }
    }

    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn into_inner(self) -> P {
        self.pipe
    }

    /// True if at least one complete frame is buffered.
    pub fn has_frame(&self) -> bool {
        self.pipe.node().with_buffer(|buf| can_deserialize(buf))
    }

    /// Decode every complete buffered frame, passing each call to `handle`.
    ///
    /// A trailing partial frame stays buffered for the next drain. No-op
    /// frames are skipped. On a decode error the rest of the buffer is
    /// discarded, since its alignment is unknown, and the error returned.
    pub fn drain(&self, mut handle: impl FnMut(Call)) -> Result<usize> {
        let node = self.pipe.node();
        let mut decoded = 0usize;
        loop {
            // The buffer borrow ends before `handle` runs, so it may feed
            // the node again.
            let step = node.with_buffer(|buf| self.codec.deserialize(buf));
            match step {
                Ok(Decoded::Incomplete) => return Ok(decoded),
                Ok(Decoded::NoOp) => continue,
                Ok(Decoded::Call(call)) => {
                    decoded += 1;
                    handle(call);
                }
                Err(err) => {
                    let dropped = node.clear_buffer();
                    warn!(
                        node = node.id(),
                        error = %err,
                        dropped,
                        "discarded buffer after decode error"
                    );
                    return Err(err.into());
                }
            }
        }
    }

    /// Decode every complete buffered frame into a vector.
    pub fn drain_calls(&self) -> Result<Vec<Call>> {
        let mut calls = Vec::new();
        self.drain(|call| calls.push(call))?;
        Ok(calls)
    }

    /// Encode `call` and write all of it, retrying short writes.
    ///
    /// Fails with [`PipeError::Stalled`] if the pipe accepts zero bytes
    /// before the frame is complete, for example because no transport is
    /// bound. Returns the frame length.
    pub fn send_call(&self, call: &Call) -> Result<usize> {
        let mut frame = BytesMut::new();
        self.codec.encode_call(call, &mut frame)?;
        self.write_frame(&frame)
    }

    /// Encode a call from its parts and write it.
    pub fn send(&self, name: &str, args: &[Value]) -> Result<usize> {
        let frame = self.codec.serialize(name, args)?;
        self.write_frame(&frame)
    }

    /// Write a zero-length keep-alive frame.
    pub fn send_noop(&self) -> Result<usize> {
        let mut frame = BytesMut::new();
        self.codec.encode_noop(&mut frame);
        self.write_frame(&frame)
    }

    fn write_frame(&self, frame: &[u8]) -> Result<usize> {
        let total = frame.len();
        let mut written = 0usize;
        while written < total {
            match self.pipe.send(&frame[written..])? {
                0 => {
                    debug!(node = self.pipe.node().id(), written, total, "pipe stalled");
                    return Err(PipeError::Stalled { written, total });
                }
                n => written += n,
            }
        }
        Ok(total)
    }
}
