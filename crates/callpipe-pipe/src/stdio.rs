use std::cell::{Cell, RefCell};
use std::io::{self, ErrorKind, Read, Write};

use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::node::PipeNode;
use crate::traits::Pipe;

type EndListener = Box<dyn FnOnce()>;

/// Bridges a blocking reader and writer (normally stdin and stdout) into
/// the pipe model.
///
/// Each [`poll`](StdioPipe::poll) reads exactly one byte and feeds it to the
/// node. End of input fires the end-of-stream callbacks once; afterwards
/// `poll` returns `Ok(false)` without touching the reader. Sends are written
/// with one write call and flushed immediately.
pub struct StdioPipe<R, W> {
    node: PipeNode,
    reader: RefCell<R>,
    writer: RefCell<W>,
    eof: Cell<bool>,
    on_eof: RefCell<Vec<EndListener>>,
}

impl StdioPipe<io::Stdin, io::Stdout> {
    /// Bridge the process's standard input and output.
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> StdioPipe<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            node: PipeNode::with_kind("stdio", false),
            reader: RefCell::new(reader),
            writer: RefCell::new(writer),
            eof: Cell::new(false),
            on_eof: RefCell::new(Vec::new()),
        }
    }

    /// Read one byte and deliver it. Returns false once input has ended.
    pub fn poll(&self) -> Result<bool> {
        if self.eof.get() {
            return Ok(false);
        }

        let mut byte = [0u8; 1];
        let read = loop {
            match self.reader.borrow_mut().read(&mut byte) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };

        if read == 0 {
            self.finish();
            return Ok(false);
        }

        self.node.receive(Bytes::copy_from_slice(&byte), None);
        Ok(true)
    }

    /// Poll until end of input. Returns the number of bytes delivered.
    pub fn pump(&self) -> Result<usize> {
        let mut delivered = 0usize;
        while self.poll()? {
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Register a callback for end of input.
    ///
    /// If input has already ended the callback runs immediately.
    pub fn on_end_of_stream(&self, callback: impl FnOnce() + 'static) {
        if self.eof.get() {
            callback();
            return;
        }
        self.on_eof.borrow_mut().push(Box::new(callback));
    }

    pub fn is_eof(&self) -> bool {
        self.eof.get()
    }

    /// Write `data` with a single write call, then flush.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let mut writer = self.writer.borrow_mut();
        let written = loop {
            match writer.write(data) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };
        writer.flush()?;
        Ok(written)
    }

    pub fn node(&self) -> &PipeNode {
        &self.node
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }

    fn finish(&self) {
        if self.eof.replace(true) {
            return;
        }
        debug!(node = self.node.id(), buffered = self.node.buffered_len(), "end of input");
        let callbacks = std::mem::take(&mut *self.on_eof.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

impl<R: Read, W: Write> Pipe for StdioPipe<R, W> {
    fn node(&self) -> &PipeNode {
        &self.node
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        StdioPipe::send(self, data)
    }
}

impl<R, W> std::fmt::Debug for StdioPipe<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioPipe")
            .field("node", &self.node)
            .field("eof", &self.eof.get())
            .finish()
    }
}
