use callpipe_transport::Transport;

use crate::error::Result;
use crate::node::PipeNode;
use crate::traits::Pipe;

/// A pipe node that relays to a bound transport in both directions.
///
/// Bytes read from the transport enter the node through `receive`; bytes
/// delivered by an upstream node are written on to the transport, as are
/// bytes passed to [`send`](DelegatePipe::send). When the transport closes,
/// the binding is cleared and later sends return `Ok(0)` until rebound.
#[derive(Debug, Clone)]
pub struct DelegatePipe {
    node: PipeNode,
}

impl DelegatePipe {
    /// Create an unbound delegate.
    pub fn new() -> Self {
        Self {
            node: PipeNode::with_kind("delegate", true),
        }
    }

    /// Create a delegate bound to `transport`.
    pub fn bind(transport: Transport) -> Result<Self> {
        let pipe = Self::new();
        pipe.set_transport(Some(transport))?;
        Ok(pipe)
    }

    pub fn set_transport(&self, transport: Option<Transport>) -> Result<()> {
        self.node.set_transport(transport)
    }

    pub fn transport(&self) -> Option<Transport> {
        self.node.transport()
    }

    pub fn send(&self, data: &[u8]) -> Result<usize> {
        self.node.send(data)
    }

    pub fn node(&self) -> &PipeNode {
        &self.node
    }
}

impl Default for DelegatePipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for DelegatePipe {
    fn node(&self) -> &PipeNode {
        &self.node
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        self.node.send(data)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use callpipe_transport::MemoryEndpoint;

    use super::*;

    #[test]
    fn transport_data_reaches_node_and_sinks() {
        let (transport, remote) = MemoryEndpoint::transport();
        let pipe = DelegatePipe::bind(transport.clone()).unwrap();
        let sink = PipeNode::new();
        pipe.node().attach_sink(&sink).unwrap();

        remote.push(b"inbound");
        transport.poll(None).unwrap();

        assert_eq!(pipe.node().buffered_len(), 7);
        assert_eq!(sink.with_buffer(|buf| buf.to_vec()), b"inbound".to_vec());
        // Transport data is not echoed back.
        assert!(remote.take_written().is_empty());
    }

    #[test]
    fn upstream_data_is_forwarded_to_transport() {
        let (transport, remote) = MemoryEndpoint::transport();
        let pipe = DelegatePipe::bind(transport).unwrap();
        let upstream = PipeNode::new();
        upstream.attach_sink(pipe.node()).unwrap();

        upstream.receive(Bytes::from_static(b"tee"), None);

        assert_eq!(remote.take_written(), Bytes::from("tee"));
        assert_eq!(pipe.node().buffered_len(), 3);
    }

    #[test]
    fn forwarding_retries_short_writes() {
        let (transport, remote) = MemoryEndpoint::transport();
        remote.set_write_limit(Some(3));
        let pipe = DelegatePipe::bind(transport).unwrap();
        let upstream = PipeNode::new();
        upstream.attach_sink(pipe.node()).unwrap();

        upstream.receive(Bytes::from_static(b"abcdef"), None);
        upstream.receive(Bytes::from_static(b"ghijk"), None);

        assert_eq!(remote.take_written(), Bytes::from("abcdefghijk"));
    }

    #[test]
    fn relayed_frames_stay_aligned_over_short_writes() {
        use callpipe_frame::{Call, FrameCodec};

        use crate::CallChannel;

        let (transport, remote) = MemoryEndpoint::transport();
        remote.set_write_limit(Some(3));
        let pipe = DelegatePipe::bind(transport).unwrap();
        let upstream = PipeNode::new();
        upstream.attach_sink(pipe.node()).unwrap();

        let calls = vec![
            Call::new("first").arg("payload"),
            Call::new("second").arg(2i64),
        ];
        for call in &calls {
            let frame = FrameCodec::default()
                .serialize(call.name(), call.args())
                .unwrap();
            upstream.receive(frame, None);
        }

        let far_end = CallChannel::new(PipeNode::new());
        far_end.pipe().receive(remote.take_written(), None);
        assert_eq!(far_end.drain_calls().unwrap(), calls);
    }

    #[test]
    fn stalled_transport_ends_forwarding() {
        let (transport, remote) = MemoryEndpoint::transport();
        remote.set_write_limit(Some(0));
        let pipe = DelegatePipe::bind(transport).unwrap();
        let upstream = PipeNode::new();
        upstream.attach_sink(pipe.node()).unwrap();

        upstream.receive(Bytes::from_static(b"stuck"), None);

        assert!(remote.take_written().is_empty());
        assert_eq!(pipe.node().buffered_len(), 5);
    }

    #[test]
    fn send_goes_to_transport() {
        let (transport, remote) = MemoryEndpoint::transport();
        let pipe = DelegatePipe::bind(transport).unwrap();

        assert_eq!(pipe.send(b"out").unwrap(), 3);
        assert_eq!(remote.take_written(), Bytes::from("out"));
    }

    #[test]
    fn closure_turns_sends_into_no_ops() {
        let (transport, remote) = MemoryEndpoint::transport();
        let pipe = DelegatePipe::bind(transport.clone()).unwrap();

        transport.close();

        assert!(pipe.transport().is_none());
        assert_eq!(pipe.send(b"dropped").unwrap(), 0);
        assert!(remote.take_written().is_empty());
    }

    #[test]
    fn rebind_after_closure() {
        let (old, _old_remote) = MemoryEndpoint::transport();
        let pipe = DelegatePipe::bind(old.clone()).unwrap();
        old.close();

        let (fresh, fresh_remote) = MemoryEndpoint::transport();
        pipe.set_transport(Some(fresh)).unwrap();

        assert_eq!(pipe.send(b"again").unwrap(), 5);
        assert_eq!(fresh_remote.take_written(), Bytes::from("again"));
    }

    #[test]
    fn unbound_delegate_drops_forwarded_data() {
        let pipe = DelegatePipe::new();
        let upstream = PipeNode::new();
        upstream.attach_sink(pipe.node()).unwrap();

        upstream.receive(Bytes::from_static(b"nowhere"), None);
        assert_eq!(pipe.node().buffered_len(), 7);
        assert_eq!(pipe.send(b"x").unwrap(), 0);
    }
}
