use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::call::Call;
use crate::codec::{CodecConfig, Decoded, FrameCodec};
use crate::error::FrameError;

/// `tokio_util` adapter over [`FrameCodec`] for use with `Framed`.
///
/// No-op frames are consumed silently; the stream only yields calls.
#[derive(Debug, Clone, Default)]
pub struct CallCodec {
    codec: FrameCodec,
}

impl CallCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            codec: FrameCodec::new(config),
        }
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}

impl Decoder for CallCodec {
    type Item = Call;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Call>, FrameError> {
        loop {
            match self.codec.deserialize(src)? {
                Decoded::Call(call) => return Ok(Some(call)),
                Decoded::NoOp => continue,
                Decoded::Incomplete => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Call>, FrameError> {
        match self.decode(src)? {
            Some(call) => Ok(Some(call)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<&Call> for CallCodec {
    type Error = FrameError;

    fn encode(&mut self, call: &Call, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.codec.encode_call(call, dst)
    }
}

impl Encoder<Call> for CallCodec {
    type Error = FrameError;

    fn encode(&mut self, call: Call, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.codec.encode_call(&call, dst)
    }
}
