use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Endpoint, EndpointPoll};

/// Size of each read issued by the reader thread.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

enum Chunk {
    Data(Bytes),
    Eof,
    Failed(std::io::Error),
}

/// Endpoint over a blocking `Read` + `Write` pair.
///
/// The reader is moved to a dedicated thread that forwards owned chunks over a
/// channel; nothing on that thread touches a transport or a pipe node. The
/// owning thread picks chunks up in [`Endpoint::poll`], optionally blocking on
/// the channel for a bounded time.
pub struct StreamEndpoint {
    rx: Receiver<Chunk>,
    pending: BytesMut,
    writer: Box<dyn Write>,
    eof: bool,
    _reader: JoinHandle<()>,
    #[cfg(unix)]
    unix: Option<std::os::unix::net::UnixStream>,
}

impl StreamEndpoint {
    /// Start a reader thread over `reader` and write through `writer`.
    pub fn spawn<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("callpipe-reader".to_string())
            .spawn(move || read_loop(reader, tx))
            .map_err(TransportError::ReaderThread)?;

        Ok(Self {
            rx,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            writer: Box::new(writer),
            eof: false,
            _reader: handle,
            #[cfg(unix)]
            unix: None,
        })
    }

    /// Wrap a connected Unix stream. The stream is shut down on drop so the
    /// reader thread exits.
    #[cfg(unix)]
    pub fn unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let shutdown = stream.try_clone()?;
        let mut endpoint = Self::spawn(reader, stream)?;
        endpoint.unix = Some(shutdown);
        Ok(endpoint)
    }

    fn absorb(&mut self, chunk: Chunk) -> Result<()> {
        match chunk {
            Chunk::Data(data) => {
                self.pending.extend_from_slice(&data);
                Ok(())
            }
            Chunk::Eof => {
                self.eof = true;
                Ok(())
            }
            Chunk::Failed(err) => {
                self.eof = true;
                Err(TransportError::Io(err))
            }
        }
    }

    fn drain_channel(&mut self) -> Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.absorb(chunk)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    self.eof = true;
                    return Ok(());
                }
            }
        }
    }
}

fn read_loop<R: Read>(mut reader: R, tx: mpsc::Sender<Chunk>) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("stream reader reached end of input");
                let _ = tx.send(Chunk::Eof);
                return;
            }
            Ok(n) => {
                if tx.send(Chunk::Data(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "stream reader failed");
                let _ = tx.send(Chunk::Failed(err));
                return;
            }
        }
    }
}

impl Endpoint for StreamEndpoint {
    fn bytes_available(&self) -> usize {
        self.pending.len()
    }

    fn read(&mut self, max: usize) -> Result<Bytes> {
        let n = max.min(self.pending.len());
        Ok(self.pending.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.writer.write(data) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.writer.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn poll(&mut self, wait: Option<Duration>) -> Result<EndpointPoll> {
        if !self.eof {
            self.drain_channel()?;
        }

        if self.pending.is_empty() && !self.eof {
            if let Some(timeout) = wait {
                match self.rx.recv_timeout(timeout) {
                    Ok(chunk) => {
                        self.absorb(chunk)?;
                        self.drain_channel()?;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => self.eof = true,
                }
            }
        }

        if !self.pending.is_empty() {
            Ok(EndpointPoll::Ready(self.pending.len()))
        } else if self.eof {
            Ok(EndpointPoll::Eof)
        } else {
            Ok(EndpointPoll::Idle)
        }
    }

    fn kind(&self) -> &'static str {
        "stream"
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(stream) = self.unix.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
