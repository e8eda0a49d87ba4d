//! Tagged argument values and their versioned wire encoding.
//!
//! Every value is a one-byte tag followed by a body:
//!
//! ```text
//! tag  type   body                                  since
//! 0x00 Null   -                                     v1
//! 0x01 Bool   u8 (0 or 1)                           v1
//! 0x02 Int    i64 LE                                v1
//! 0x03 Float  f64 LE (IEEE-754 bits)                v1
//! 0x04 Str    u32 LE length + UTF-8                 v1
//! 0x05 Bytes  u32 LE length + raw bytes             v1
//! 0x06 UInt   u64 LE                                v2
//! 0x07 List   u32 LE count + values                 v2
//! 0x08 Map    u32 LE count + (Str key, value) pairs v2
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, ProtocolError, Result};

pub(crate) const TAG_NULL: u8 = 0x00;
pub(crate) const TAG_BOOL: u8 = 0x01;
pub(crate) const TAG_INT: u8 = 0x02;
pub(crate) const TAG_FLOAT: u8 = 0x03;
pub(crate) const TAG_STR: u8 = 0x04;
pub(crate) const TAG_BYTES: u8 = 0x05;
pub(crate) const TAG_UINT: u8 = 0x06;
pub(crate) const TAG_LIST: u8 = 0x07;
pub(crate) const TAG_MAP: u8 = 0x08;

/// Maximum nesting of lists and maps accepted by the decoder.
pub const MAX_DEPTH: usize = 32;

/// Encoding revision for tagged values. Both ends of a link must agree;
/// nothing on the wire identifies the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WireVersion {
    /// Scalars, strings and byte arrays.
    V1 = 1,
    /// Adds unsigned integers, lists and maps.
    V2 = 2,
}

impl WireVersion {
    pub const DEFAULT: WireVersion = WireVersion::V2;

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Default for WireVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for WireVersion {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(FrameError::UnknownVersion(other)),
        }
    }
}

impl fmt::Display for WireVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// A self-describing call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Value>),
    /// Ordered key/value pairs. Duplicate keys are kept as written.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Oldest wire version that can carry this value, nested values included.
    pub fn min_version(&self) -> WireVersion {
        match self {
            Value::UInt(_) | Value::List(_) | Value::Map(_) => WireVersion::V2,
            _ => WireVersion::V1,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(value))
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Append the tagged encoding of `value` to `dst`.
///
/// Lists and maps nested deeper than [`MAX_DEPTH`] are refused with
/// [`FrameError::NestingTooDeep`], matching what the decoder accepts.
pub fn encode_value(value: &Value, version: WireVersion, dst: &mut BytesMut) -> Result<()> {
    encode_nested(value, version, 0, dst)
}

fn encode_nested(
    value: &Value,
    version: WireVersion,
    depth: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    if value.min_version() > version {
        return Err(FrameError::UnsupportedValue {
            value: value.type_name(),
            version: version.as_u8(),
        });
    }

    match value {
        Value::Null => dst.put_u8(TAG_NULL),
        Value::Bool(b) => {
            dst.put_u8(TAG_BOOL);
            dst.put_u8(u8::from(*b));
        }
        Value::Int(n) => {
            dst.put_u8(TAG_INT);
            dst.put_i64_le(*n);
        }
        Value::UInt(n) => {
            dst.put_u8(TAG_UINT);
            dst.put_u64_le(*n);
        }
        Value::Float(x) => {
            dst.put_u8(TAG_FLOAT);
            dst.put_f64_le(*x);
        }
        Value::Str(s) => encode_str(s, dst)?,
        Value::Bytes(b) => {
            dst.put_u8(TAG_BYTES);
            put_len(b.len(), dst)?;
            dst.put_slice(b);
        }
        Value::List(items) => {
            if depth >= MAX_DEPTH {
                return Err(FrameError::NestingTooDeep { max: MAX_DEPTH });
            }
            dst.put_u8(TAG_LIST);
            put_len(items.len(), dst)?;
            for item in items {
                encode_nested(item, version, depth + 1, dst)?;
            }
        }
        Value::Map(entries) => {
            if depth >= MAX_DEPTH {
                return Err(FrameError::NestingTooDeep { max: MAX_DEPTH });
            }
            dst.put_u8(TAG_MAP);
            put_len(entries.len(), dst)?;
            for (key, item) in entries {
                encode_str(key, dst)?;
                encode_nested(item, version, depth + 1, dst)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn encode_str(s: &str, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(TAG_STR);
    put_len(s.len(), dst)?;
    dst.put_slice(s.as_bytes());
    Ok(())
}

fn put_len(len: usize, dst: &mut BytesMut) -> Result<()> {
    let len32 = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    dst.put_u32_le(len32);
    Ok(())
}

/// Decode one tagged value from the front of `src`, advancing it.
pub fn decode_value(
    src: &mut &[u8],
    version: WireVersion,
) -> std::result::Result<Value, ProtocolError> {
    decode_nested(src, version, 0)
}

fn decode_nested(
    src: &mut &[u8],
    version: WireVersion,
    depth: usize,
) -> std::result::Result<Value, ProtocolError> {
    let tag = take_u8(src)?;
    check_tag(tag, version)?;

    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => match take_u8(src)? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(ProtocolError::InvalidBool(other)),
        },
        TAG_INT => {
            need(src, 8)?;
            Value::Int(src.get_i64_le())
        }
        TAG_UINT => {
            need(src, 8)?;
            Value::UInt(src.get_u64_le())
        }
        TAG_FLOAT => {
            need(src, 8)?;
            Value::Float(src.get_f64_le())
        }
        TAG_STR => Value::Str(decode_str_body(src)?),
        TAG_BYTES => {
            let len = take_len(src)?;
            Value::Bytes(Bytes::copy_from_slice(take(src, len)?))
        }
        TAG_LIST => {
            if depth >= MAX_DEPTH {
                return Err(ProtocolError::DepthExceeded(MAX_DEPTH));
            }
            let count = take_len(src)?;
            // Every value is at least one byte; never trust the count beyond that.
            let mut items = Vec::with_capacity(count.min(src.len()));
            for _ in 0..count {
                items.push(decode_nested(src, version, depth + 1)?);
            }
            Value::List(items)
        }
        TAG_MAP => {
            if depth >= MAX_DEPTH {
                return Err(ProtocolError::DepthExceeded(MAX_DEPTH));
            }
            let count = take_len(src)?;
            let mut entries = Vec::with_capacity(count.min(src.len() / 2));
            for _ in 0..count {
                let key_tag = take_u8(src)?;
                if key_tag != TAG_STR {
                    return Err(ProtocolError::MapKeyNotString(key_tag));
                }
                let key = decode_str_body(src)?;
                entries.push((key, decode_nested(src, version, depth + 1)?));
            }
            Value::Map(entries)
        }
        other => return Err(ProtocolError::UnknownTag(other)),
    };
    Ok(value)
}

fn check_tag(tag: u8, version: WireVersion) -> std::result::Result<(), ProtocolError> {
    let required = match tag {
        TAG_NULL..=TAG_BYTES => WireVersion::V1,
        TAG_UINT..=TAG_MAP => WireVersion::V2,
        other => return Err(ProtocolError::UnknownTag(other)),
    };
    if required > version {
        return Err(ProtocolError::TagNotInVersion {
            tag,
            required: required.as_u8(),
            version: version.as_u8(),
        });
    }
    Ok(())
}

pub(crate) fn decode_str_body(src: &mut &[u8]) -> std::result::Result<String, ProtocolError> {
    let len = take_len(src)?;
    let raw = take(src, len)?;
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

pub(crate) fn take_u8(src: &mut &[u8]) -> std::result::Result<u8, ProtocolError> {
    need(src, 1)?;
    Ok(src.get_u8())
}

fn take_len(src: &mut &[u8]) -> std::result::Result<usize, ProtocolError> {
    need(src, 4)?;
    Ok(src.get_u32_le() as usize)
}

fn take<'a>(src: &mut &'a [u8], len: usize) -> std::result::Result<&'a [u8], ProtocolError> {
    need(src, len)?;
    let whole: &'a [u8] = *src;
    let (head, tail) = whole.split_at(len);
    *src = tail;
    Ok(head)
}

fn need(src: &[u8], needed: usize) -> std::result::Result<(), ProtocolError> {
    if src.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}
