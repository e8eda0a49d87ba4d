use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::call::{Call, MAX_ARGS};
use crate::error::{FrameError, ProtocolError, Result};
use crate::value::{self, Value, WireVersion, TAG_STR};

/// Frame header: payload length (4, little-endian).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for the call codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Tagged-value encoding revision. Default: [`WireVersion::DEFAULT`].
    pub version: WireVersion,
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version: WireVersion::DEFAULT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Result of one decode step.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The buffer does not yet hold a complete frame. Nothing was consumed.
    Incomplete,
    /// A zero-length frame was consumed; there is nothing to act on.
    NoOp,
    /// A complete call was consumed.
    Call(Call),
}

/// Encodes calls into length-prefixed frames and decodes them back.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────────────────────────────────┐
/// │ Length (4B)  │ Payload (Length bytes)                          │
/// │ u32 LE       │ Str(name) │ u8 argc (0..=8) │ Value × argc       │
/// └──────────────┴─────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Codec with default limits and an explicit wire version.
    pub fn with_version(version: WireVersion) -> Self {
        Self::new(CodecConfig {
            version,
            ..CodecConfig::default()
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn version(&self) -> WireVersion {
        self.config.version
    }

    /// Encode `name` and up to eight `args` into a standalone frame.
    ///
    /// Arguments past the eighth are not encoded. Values nested past
    /// [`MAX_DEPTH`](crate::MAX_DEPTH) fail with [`FrameError::NestingTooDeep`].
    pub fn serialize(&self, name: &str, args: &[Value]) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.encode_parts(name, args, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the frame for `call` to `dst`.
    pub fn encode_call(&self, call: &Call, dst: &mut BytesMut) -> Result<()> {
        self.encode_parts(call.name(), call.args(), dst)
    }

    /// Append a zero-length frame, which decodes as [`Decoded::NoOp`].
    pub fn encode_noop(&self, dst: &mut BytesMut) {
        dst.put_u32_le(0);
    }

    fn encode_parts(&self, name: &str, args: &[Value], dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        let result = self.encode_payload(name, args, start, dst);
        if result.is_err() {
            dst.truncate(start);
        }
        result
    }

    fn encode_payload(
        &self,
        name: &str,
        args: &[Value],
        start: usize,
        dst: &mut BytesMut,
    ) -> Result<()> {
        let count = args.len().min(MAX_ARGS);
        if args.len() > MAX_ARGS {
            debug!(
                call = name,
                dropped = args.len() - MAX_ARGS,
                "discarded arguments past the eighth"
            );
        }

        dst.put_u32_le(0);
        value::encode_str(name, dst)?;
        dst.put_u8(count as u8);
        for arg in &args[..count] {
            value::encode_value(arg, self.config.version, dst)?;
        }

        let payload_len = dst.len() - start - HEADER_SIZE;
        let max = self.config.max_payload_size.min(u32::MAX as usize);
        if payload_len > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max,
            });
        }
        dst[start..start + HEADER_SIZE].copy_from_slice(&(payload_len as u32).to_le_bytes());
        trace!(call = name, args = count, payload_len, "encoded call");
        Ok(())
    }

    /// True if `src` holds a complete frame: a header plus the payload it
    /// declares.
    pub fn can_deserialize(&self, src: &[u8]) -> bool {
        can_deserialize(src)
    }

    /// Decode the next frame from the front of `src`.
    ///
    /// On a complete frame, header and payload are removed from `src` whatever
    /// the outcome of parsing. An incomplete frame leaves `src` untouched.
    pub fn deserialize(&self, src: &mut BytesMut) -> Result<Decoded> {
        let Some(declared) = declared_length(src) else {
            return Ok(Decoded::Incomplete);
        };

        if declared > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: declared,
                max: self.config.max_payload_size,
            });
        }

        if !can_deserialize(src) {
            return Ok(Decoded::Incomplete);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(declared);
        if payload.is_empty() {
            trace!("decoded no-op frame");
            return Ok(Decoded::NoOp);
        }

        match self.decode_payload(&payload) {
            Ok(call) => {
                trace!(call = call.name(), args = call.args().len(), "decoded call");
                Ok(Decoded::Call(call))
            }
            Err(err) => {
                warn!(error = %err, payload_len = declared, "corrupt call frame");
                Err(err.into())
            }
        }
    }

    /// Parse a frame payload (without its length header).
    pub fn decode_payload(&self, payload: &[u8]) -> std::result::Result<Call, ProtocolError> {
        let mut cursor = payload;

        let tag = value::take_u8(&mut cursor)?;
        if tag != TAG_STR {
            return Err(ProtocolError::NameNotString(tag));
        }
        let name = value::decode_str_body(&mut cursor)?;

        let count = value::take_u8(&mut cursor)?;
        if usize::from(count) > MAX_ARGS {
            return Err(ProtocolError::TooManyArgs(count));
        }

        let mut call = Call::new(name);
        for _ in 0..count {
            call.push_arg(value::decode_value(&mut cursor, self.config.version)?);
        }

        if !cursor.is_empty() {
            return Err(ProtocolError::TrailingBytes(cursor.len()));
        }
        Ok(call)
    }
}

/// Payload length declared by the header at the front of `src`, if the
/// header is complete.
pub fn declared_length(src: &[u8]) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_le_bytes(header) as usize)
}

/// True if `src` holds at least one complete frame.
pub fn can_deserialize(src: &[u8]) -> bool {
    match declared_length(src) {
        Some(declared) => declared <= src.len() - HEADER_SIZE,
        None => false,
    }
}
