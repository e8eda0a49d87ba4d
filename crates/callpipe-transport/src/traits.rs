use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// Outcome of polling an endpoint for inbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPoll {
    /// `n` bytes are buffered and can be read without blocking.
    Ready(usize),
    /// Nothing new arrived; the endpoint is still open.
    Idle,
    /// The remote side finished; no further data will arrive.
    Eof,
}

/// A concrete byte source and sink: socket, file, process stream or memory.
///
/// Endpoints never call back into the pipe layer themselves. Readiness is
/// reported through [`Endpoint::poll`], and the owning
/// [`Transport`](crate::Transport) turns it into notifications.
pub trait Endpoint {
    /// Bytes that can be read right now without blocking.
    fn bytes_available(&self) -> usize;

    /// Read up to `max` already-available bytes. Returns an empty buffer when
    /// nothing is available.
    fn read(&mut self, max: usize) -> Result<Bytes>;

    /// Write as much of `data` as the endpoint accepts and return the count.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush buffered outbound bytes.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Check for newly arrived data, blocking for at most `wait` when given.
    fn poll(&mut self, wait: Option<Duration>) -> Result<EndpointPoll> {
        let _ = wait;
        match self.bytes_available() {
            0 => Ok(EndpointPoll::Idle),
            n => Ok(EndpointPoll::Ready(n)),
        }
    }

    /// Endpoint name for diagnostics.
    fn kind(&self) -> &'static str;
}
