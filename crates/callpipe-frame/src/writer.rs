use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::call::Call;
use crate::codec::{CodecConfig, FrameCodec};
use crate::error::{FrameError, Result};
use crate::value::Value;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete call frames to any blocking `Write` stream.
pub struct CallWriter<T> {
    inner: T,
    buf: BytesMut,
    codec: FrameCodec,
}

impl<T: Write> CallWriter<T> {
    /// Create a new call writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new call writer with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: FrameCodec::new(config),
        }
    }

    /// Encode and write one call, retrying short writes (blocking).
    pub fn write_call(&mut self, call: &Call) -> Result<()> {
        self.buf.clear();
        self.codec.encode_call(call, &mut self.buf)?;
        self.write_buffered()
    }

    /// Encode and write a call from its parts.
    pub fn send(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.buf.clear();
        let frame = self.codec.serialize(name, args)?;
        self.buf.extend_from_slice(&frame);
        self.write_buffered()
    }

    /// Write an empty keep-alive frame.
    pub fn write_noop(&mut self) -> Result<()> {
        self.buf.clear();
        self.codec.encode_noop(&mut self.buf);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current codec.
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::Decoded;
    use crate::value::WireVersion;

    fn decode_one(bytes: &[u8]) -> Decoded {
        let mut wire = BytesMut::from(bytes);
        FrameCodec::default().deserialize(&mut wire).unwrap()
    }

    #[test]
    fn write_single_call() {
        let mut writer = CallWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_call(&Call::new("hello").arg("world")).unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(
            decode_one(&bytes),
            Decoded::Call(Call::new("hello").arg("world"))
        );
    }

    #[test]
    fn send_from_parts_truncates_past_eight() {
        let mut writer = CallWriter::new(Cursor::new(Vec::<u8>::new()));
        let args: Vec<Value> = (0..10).map(Value::Int).collect();
        writer.send("wide", &args).unwrap();

        let bytes = writer.into_inner().into_inner();
        match decode_one(&bytes) {
            Decoded::Call(call) => assert_eq!(call.args().len(), 8),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn noop_frame_is_four_zero_bytes() {
        let mut writer = CallWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_noop().unwrap();
        assert_eq!(writer.into_inner().into_inner(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn short_writes_are_retried() {
        let mut writer = CallWriter::new(TrickleWriter::default());
        writer.write_call(&Call::new("trickle").arg(7i64)).unwrap();

        let inner = writer.into_inner();
        assert!(inner.flushed);
        assert_eq!(
            decode_one(&inner.data),
            Decoded::Call(Call::new("trickle").arg(7i64))
        );
    }

    #[test]
    fn unsupported_value_is_not_written() {
        let cfg = CodecConfig {
            version: WireVersion::V1,
            ..CodecConfig::default()
        };
        let mut writer = CallWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer
            .write_call(&Call::new("v2").arg(Value::List(vec![])))
            .unwrap_err();

        assert!(matches!(err, FrameError::UnsupportedValue { .. }));
        assert!(writer.into_inner().into_inner().is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = CallWriter::new(ZeroWriter);
        let err = writer.write_call(&Call::new("x")).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        let mut writer = CallWriter::new(FlakyWriter {
            failures: vec![ErrorKind::Interrupted, ErrorKind::WouldBlock],
            data: Vec::new(),
        });
        writer.write_call(&Call::new("retry")).unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[derive(Default)]
    struct TrickleWriter {
        data: Vec<u8>,
        flushed: bool,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    struct FlakyWriter {
        failures: Vec<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.failures.pop() {
                return Err(std::io::Error::from(kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
