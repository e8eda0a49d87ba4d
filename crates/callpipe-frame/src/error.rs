/// A frame payload that failed to parse under the active wire version.
///
/// Returned instead of a partially decoded call. The frame that produced it
/// has already been consumed, but the alignment of anything after it is
/// unknown; callers should treat it as fatal for the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A value's body runs past the end of the payload.
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A value tag that no wire version defines.
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),

    /// A value tag introduced by a later wire version than the link uses.
    #[error("value tag {tag:#04x} requires wire version {required}, link uses {version}")]
    TagNotInVersion { tag: u8, required: u8, version: u8 },

    /// A bool body other than 0 or 1.
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    /// A string body that is not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// The payload does not start with a tagged string.
    #[error("call name must be a string, found tag {0:#04x}")]
    NameNotString(u8),

    /// A map key that is not a tagged string.
    #[error("map key must be a string, found tag {0:#04x}")]
    MapKeyNotString(u8),

    /// The argument count byte is above the per-call cap.
    #[error("argument count {0} exceeds maximum of 8")]
    TooManyArgs(u8),

    /// Lists or maps nested beyond the decoder's depth limit.
    #[error("values nested deeper than {0}")]
    DepthExceeded(usize),

    /// Bytes left in the payload after the last argument.
    #[error("{0} trailing bytes after last argument")]
    TrailingBytes(usize),
}

/// Errors that can occur during call encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The value cannot be expressed in the active wire version.
    #[error("{value} values require wire version 2, link uses {version}")]
    UnsupportedValue { value: &'static str, version: u8 },

    /// The value nests lists or maps deeper than a decoder accepts.
    #[error("value nests deeper than {max} levels")]
    NestingTooDeep { max: usize },

    /// A wire version number that this crate does not implement.
    #[error("unknown wire version {0}")]
    UnknownVersion(u8),

    /// The frame payload is corrupt or was written with another wire version.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
