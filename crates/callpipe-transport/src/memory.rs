use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::traits::{Endpoint, EndpointPoll};
use crate::transport::Transport;

#[derive(Debug, Default)]
struct MemoryState {
    inbound: BytesMut,
    outbound: BytesMut,
    write_limit: Option<usize>,
    eof: bool,
}

/// In-process endpoint backed by two byte queues.
///
/// The paired [`MemoryRemote`] plays the other side of the link: it pushes
/// the bytes this endpoint reads and collects the bytes it writes.
#[derive(Debug)]
pub struct MemoryEndpoint {
    state: Rc<RefCell<MemoryState>>,
}

/// The far side of a [`MemoryEndpoint`].
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryEndpoint {
    /// Create an endpoint and its remote controller.
    pub fn pair() -> (Self, MemoryRemote) {
        let state = Rc::new(RefCell::new(MemoryState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            MemoryRemote { state },
        )
    }

    /// Create a memory endpoint already wrapped in a [`Transport`].
    pub fn transport() -> (Transport, MemoryRemote) {
        let (endpoint, remote) = Self::pair();
        (Transport::new(endpoint), remote)
    }
}

impl Endpoint for MemoryEndpoint {
    fn bytes_available(&self) -> usize {
        self.state.borrow().inbound.len()
    }

    fn read(&mut self, max: usize) -> Result<Bytes> {
        let mut state = self.state.borrow_mut();
        let n = max.min(state.inbound.len());
        Ok(state.inbound.split_to(n).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        let n = match state.write_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        state.outbound.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn poll(&mut self, _wait: Option<std::time::Duration>) -> Result<EndpointPoll> {
        let state = self.state.borrow();
        if !state.inbound.is_empty() {
            Ok(EndpointPoll::Ready(state.inbound.len()))
        } else if state.eof {
            Ok(EndpointPoll::Eof)
        } else {
            Ok(EndpointPoll::Idle)
        }
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

impl MemoryRemote {
    /// Queue bytes for the endpoint to read.
    pub fn push(&self, data: &[u8]) {
        self.state.borrow_mut().inbound.extend_from_slice(data);
    }

    /// Take everything the endpoint has written so far.
    pub fn take_written(&self) -> Bytes {
        self.state.borrow_mut().outbound.split().freeze()
    }

    /// Cap every write at `limit` bytes to simulate short writes.
    /// `Some(0)` makes the endpoint accept nothing.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.borrow_mut().write_limit = limit;
    }

    /// Signal end of input once the queued bytes are drained.
    pub fn finish(&self) {
        self.state.borrow_mut().eof = true;
    }
}
