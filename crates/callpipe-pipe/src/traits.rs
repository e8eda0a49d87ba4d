use crate::error::Result;
use crate::node::PipeNode;

/// A pipe adapter: a [`PipeNode`] plus the way it writes outbound bytes.
///
/// Implemented by the bare node and by every adapter, so code layered on top
/// (such as [`CallChannel`](crate::CallChannel)) works with any of them.
pub trait Pipe {
    /// The node holding this pipe's inbound buffer and sinks.
    fn node(&self) -> &PipeNode;

    /// Write `data` outbound. Returns the number of bytes accepted, which
    /// may be short, and is zero when nothing can accept them.
    fn send(&self, data: &[u8]) -> Result<usize>;
}

impl Pipe for PipeNode {
    fn node(&self) -> &PipeNode {
        self
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        PipeNode::send(self, data)
    }
}

impl<P: Pipe + ?Sized> Pipe for &P {
    fn node(&self) -> &PipeNode {
        (**self).node()
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        (**self).send(data)
    }
}
