//! Length-prefixed, versioned framing for named calls.
//!
//! Every frame is a 4-byte little-endian payload length followed by the
//! payload: a string-tagged call name, a one-byte argument count (at most
//! eight) and that many tagged values. A zero-length frame is a no-op.
//!
//! Decoding is stream-safe: [`FrameCodec::deserialize`] consumes nothing
//! until a whole frame is buffered, so callers may feed arbitrary chunks.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod call;
pub mod codec;
pub mod error;
pub mod reader;
pub mod value;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::CallCodec;
pub use call::{Call, MAX_ARGS};
pub use codec::{
    can_deserialize, declared_length, CodecConfig, Decoded, FrameCodec, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE,
};
pub use error::{FrameError, ProtocolError, Result};
pub use reader::CallReader;
pub use value::{decode_value, encode_value, Value, WireVersion, MAX_DEPTH};
pub use writer::CallWriter;
