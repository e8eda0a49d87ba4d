use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use callpipe_transport::{SubscriptionId, Transport, TransportError, TransportListener};
use tracing::{debug, trace, warn};

use crate::error::{PipeError, Result};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`PipeNode::attach_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

type Listener = Rc<dyn Fn(&Bytes)>;

enum Sink {
    Node(Weak<NodeInner>),
    Listener { id: ListenerId, callback: Listener },
}

enum Target {
    Node(Rc<NodeInner>),
    Listener(Listener),
}

struct Binding {
    transport: Transport,
    subscription: SubscriptionId,
}

struct NodeInner {
    id: u64,
    kind: &'static str,
    forward_inbound: bool,
    this: Weak<NodeInner>,
    buffer: RefCell<BytesMut>,
    sinks: RefCell<Vec<Sink>>,
    next_listener: Cell<u64>,
    binding: RefCell<Option<Binding>>,
}

/// A buffering, fan-out byte stream node.
///
/// Inbound chunks are appended to the node's buffer and then broadcast, in
/// registration order, to every attached sink node and listener. Outbound
/// bytes go to the bound transport, if any.
///
/// `PipeNode` is a cheap, cloneable handle; all clones share one node. Sinks
/// are held weakly, so linking never keeps a node alive and dropped sinks
/// vanish from the fan-out list.
#[derive(Clone)]
pub struct PipeNode {
    inner: Rc<NodeInner>,
}

/// Non-owning reference to a [`PipeNode`].
#[derive(Clone)]
pub struct WeakPipeNode {
    inner: Weak<NodeInner>,
}

impl PipeNode {
    /// Create an unbound node that does not forward inbound data.
    pub fn new() -> Self {
        Self::with_kind("node", false)
    }

    pub(crate) fn with_kind(kind: &'static str, forward_inbound: bool) -> Self {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        let inner = Rc::new_cyclic(|this| NodeInner {
            id,
            kind,
            forward_inbound,
            this: this.clone(),
            buffer: RefCell::new(BytesMut::new()),
            sinks: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
            binding: RefCell::new(None),
        });
        trace!(node = id, kind, "pipe node created");
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> &'static str {
        self.inner.kind
    }

    /// True if inbound data from other nodes is written on to the transport.
    pub fn forwards_inbound(&self) -> bool {
        self.inner.forward_inbound
    }

    pub fn ptr_eq(&self, other: &PipeNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakPipeNode {
        WeakPipeNode {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Accept an inbound chunk.
    ///
    /// The chunk is buffered first, then delivered to every live sink before
    /// this returns. `origin` is the node that delivered it, or `None` when it
    /// came from this node's own transport. A forwarding node writes chunks
    /// with an origin on to its transport; transport data is never echoed.
    pub fn receive(&self, data: Bytes, origin: Option<&PipeNode>) {
        if data.is_empty() {
            return;
        }

        self.inner.buffer.borrow_mut().extend_from_slice(&data);
        trace!(
            node = self.inner.id,
            len = data.len(),
            from = origin.map(PipeNode::id),
            "received chunk"
        );

        for target in self.inner.live_sinks() {
            match target {
                Target::Node(inner) => PipeNode { inner }.receive(data.clone(), Some(self)),
                Target::Listener(callback) => callback(&data),
            }
        }

        if self.inner.forward_inbound && origin.is_some() {
            self.forward(&data);
        }
    }

    /// Write a whole forwarded chunk, retrying short writes until the
    /// transport stops accepting bytes.
    fn forward(&self, data: &[u8]) {
        let Some(transport) = self.transport() else {
            return;
        };
        let total = data.len();
        let mut written = 0usize;
        while written < total {
            match transport.write(&data[written..]) {
                Ok(0) => {
                    warn!(node = self.inner.id, written, total, "forwarding stalled");
                    break;
                }
                Ok(n) => written += n,
                Err(err) => {
                    warn!(
                        node = self.inner.id,
                        written,
                        total,
                        error = %err,
                        "forwarding failed"
                    );
                    return;
                }
            }
        }
        if written > 0 {
            if let Err(err) = transport.flush() {
                warn!(node = self.inner.id, error = %err, "flush after forwarding failed");
            }
        }
    }

    /// Write `data` to the bound transport.
    ///
    /// Returns the number of bytes the transport accepted, which may be less
    /// than `data.len()`. With no transport bound this is `Ok(0)`.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let Some(transport) = self.transport() else {
            trace!(node = self.inner.id, len = data.len(), "send with no transport");
            return Ok(0);
        };
        let written = transport.write(data)?;
        if written > 0 {
            transport.flush()?;
        }
        Ok(written)
    }

    /// The bound transport, if any.
    pub fn transport(&self) -> Option<Transport> {
        self.inner
            .binding
            .borrow()
            .as_ref()
            .map(|binding| binding.transport.clone())
    }

    /// Bind to `transport`, or unbind with `None`.
    ///
    /// The previous transport is unsubscribed and released first. A transport
    /// can be bound to one node at a time; binding one held by another node
    /// fails with [`PipeError::TransportInUse`].
    pub fn set_transport(&self, transport: Option<Transport>) -> Result<()> {
        if let Some(next) = &transport {
            if self.is_bound_to(next) {
                return Ok(());
            }
            if next.is_closed() {
                return Err(TransportError::Closed.into());
            }
            if !next.claim(self.inner.id) {
                return Err(PipeError::TransportInUse(next.id()));
            }
        }

        let previous = self.inner.binding.borrow_mut().take();
        if let Some(old) = previous {
            self.inner.unbind(old);
        }

        if let Some(next) = transport {
            let listener: Weak<dyn TransportListener> = self.inner.this.clone();
            let subscription = next.subscribe(listener);
            debug!(
                node = self.inner.id,
                transport = next.id(),
                kind = next.kind(),
                "bound transport"
            );
            *self.inner.binding.borrow_mut() = Some(Binding {
                transport: next,
                subscription,
            });
        }
        Ok(())
    }

    pub fn is_bound_to(&self, transport: &Transport) -> bool {
        self.inner.is_bound_to(transport)
    }

    /// Add `sink` to the fan-out list. Attaching an attached sink is a no-op.
    ///
    /// Fails with [`PipeError::Cycle`] if delivery from `sink` can already
    /// reach this node.
    pub fn attach_sink(&self, sink: &PipeNode) -> Result<()> {
        if self.ptr_eq(sink) || sink.reaches(self) {
            return Err(PipeError::Cycle);
        }

        let weak = Rc::downgrade(&sink.inner);
        let mut sinks = self.inner.sinks.borrow_mut();
        let attached = sinks
            .iter()
            .any(|entry| matches!(entry, Sink::Node(node) if Weak::ptr_eq(node, &weak)));
        if !attached {
            sinks.push(Sink::Node(weak));
            trace!(node = self.inner.id, sink = sink.id(), "attached sink");
        }
        Ok(())
    }

    /// Remove `sink` from the fan-out list. Returns false if it was absent.
    pub fn detach_sink(&self, sink: &PipeNode) -> bool {
        let weak = Rc::downgrade(&sink.inner);
        let mut sinks = self.inner.sinks.borrow_mut();
        let before = sinks.len();
        sinks.retain(|entry| !matches!(entry, Sink::Node(node) if Weak::ptr_eq(node, &weak)));
        sinks.len() != before
    }

    /// Register a callback that sees every inbound chunk.
    pub fn attach_listener(&self, callback: impl Fn(&Bytes) + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.get());
        self.inner.next_listener.set(id.0 + 1);
        self.inner.sinks.borrow_mut().push(Sink::Listener {
            id,
            callback: Rc::new(callback),
        });
        id
    }

    pub fn detach_listener(&self, id: ListenerId) -> bool {
        let mut sinks = self.inner.sinks.borrow_mut();
        let before = sinks.len();
        sinks.retain(
            |entry| !matches!(entry, Sink::Listener { id: current, .. } if *current == id),
        );
        sinks.len() != before
    }

    /// Number of live sink nodes and listeners.
    pub fn sink_count(&self) -> usize {
        self.inner
            .sinks
            .borrow()
            .iter()
            .filter(|entry| match entry {
                Sink::Node(node) => node.strong_count() > 0,
                Sink::Listener { .. } => true,
            })
            .count()
    }

    /// Run `f` with mutable access to the inbound buffer.
    ///
    /// Decoders consume from the front of the buffer. `f` must not call back
    /// into this node.
    pub fn with_buffer<T>(&self, f: impl FnOnce(&mut BytesMut) -> T) -> T {
        f(&mut self.inner.buffer.borrow_mut())
    }

    pub fn buffered_len(&self) -> usize {
        self.inner.buffer.borrow().len()
    }

    /// Discard the inbound buffer, returning how many bytes were dropped.
    pub fn clear_buffer(&self) -> usize {
        let mut buffer = self.inner.buffer.borrow_mut();
        let dropped = buffer.len();
        buffer.clear();
        dropped
    }

    fn reaches(&self, target: &PipeNode) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![Rc::clone(&self.inner)];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            for entry in node.sinks.borrow().iter() {
                if let Sink::Node(weak) = entry {
                    if let Some(next) = weak.upgrade() {
                        if next.id == target.inner.id {
                            return true;
                        }
                        stack.push(next);
                    }
                }
            }
        }
        false
    }
}

impl Default for PipeNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeNode")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("buffered", &self.buffered_len())
            .field("sinks", &self.sink_count())
            .field("transport", &self.transport().map(|t| t.id()))
            .finish()
    }
}

impl WeakPipeNode {
    pub fn upgrade(&self) -> Option<PipeNode> {
        self.inner.upgrade().map(|inner| PipeNode { inner })
    }
}

impl fmt::Debug for WeakPipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPipeNode")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl NodeInner {
    fn live_sinks(&self) -> Vec<Target> {
        let mut sinks = self.sinks.borrow_mut();
        sinks.retain(|entry| match entry {
            Sink::Node(node) => node.strong_count() > 0,
            Sink::Listener { .. } => true,
        });
        sinks
            .iter()
            .filter_map(|entry| match entry {
                Sink::Node(node) => node.upgrade().map(Target::Node),
                Sink::Listener { callback, .. } => Some(Target::Listener(Rc::clone(callback))),
            })
            .collect()
    }

    fn is_bound_to(&self, transport: &Transport) -> bool {
        self.binding
            .borrow()
            .as_ref()
            .is_some_and(|binding| binding.transport.ptr_eq(transport))
    }

    fn unbind(&self, binding: Binding) {
        binding.transport.unsubscribe(binding.subscription);
        binding.transport.release(self.id);
        debug!(node = self.id, transport = binding.transport.id(), "unbound transport");
    }
}

impl TransportListener for NodeInner {
    fn on_ready_read(&self, transport: &Transport) {
        let Some(inner) = self.this.upgrade() else {
            return;
        };
        let node = PipeNode { inner };

        // Unbinding from inside a sink stops the drain.
        while node.is_bound_to(transport) {
            let chunk = match transport.read_available() {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(node = self.id, error = %err, "transport read failed");
                    return;
                }
            };
            if chunk.is_empty() {
                return;
            }
            node.receive(chunk, None);
        }
    }

    fn on_closed(&self, transport: &Transport) {
        if !self.is_bound_to(transport) {
            return;
        }
        let cleared = self.binding.borrow_mut().take();
        if let Some(binding) = cleared {
            debug!(node = self.id, transport = transport.id(), "bound transport closed");
            self.unbind(binding);
        }
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            self.unbind(binding);
        }
    }
}

#[cfg(test)]
mod tests {
    use callpipe_transport::MemoryEndpoint;

    use super::*;

    fn recorder(node: &PipeNode) -> Rc<RefCell<Vec<Bytes>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        node.attach_listener(move |chunk| sink.borrow_mut().push(chunk.clone()));
        seen
    }

    #[test]
    fn receive_buffers_then_notifies_in_order() {
        let node = PipeNode::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let order = Rc::clone(&order);
            let probe = node.downgrade();
            node.attach_listener(move |chunk| {
                let buffered = probe.upgrade().map(|n| n.buffered_len()).unwrap_or(0);
                order.borrow_mut().push((tag, chunk.len(), buffered));
            });
        }

        node.receive(Bytes::from_static(b"abc"), None);

        assert_eq!(*order.borrow(), vec![(0, 3, 3), (1, 3, 3), (2, 3, 3)]);
    }

    #[test]
    fn sinks_get_the_chunk_not_the_buffer() {
        let source = PipeNode::new();
        let sink = PipeNode::new();
        source.attach_sink(&sink).unwrap();
        let seen = recorder(&sink);

        source.receive(Bytes::from_static(b"one"), None);
        source.receive(Bytes::from_static(b"two"), None);

        assert_eq!(*seen.borrow(), vec![Bytes::from("one"), Bytes::from("two")]);
        assert_eq!(source.buffered_len(), 6);
        assert_eq!(sink.buffered_len(), 6);
    }

    #[test]
    fn late_sink_gets_no_backfill() {
        let source = PipeNode::new();
        source.receive(Bytes::from_static(b"early"), None);

        let late = PipeNode::new();
        source.attach_sink(&late).unwrap();
        source.receive(Bytes::from_static(b"late"), None);

        assert_eq!(late.with_buffer(|buf| buf.to_vec()), b"late".to_vec());
    }

    #[test]
    fn consuming_one_sink_leaves_others_intact() {
        let source = PipeNode::new();
        let left = PipeNode::new();
        let right = PipeNode::new();
        source.attach_sink(&left).unwrap();
        source.attach_sink(&right).unwrap();

        source.receive(Bytes::from_static(b"shared"), None);
        left.clear_buffer();

        assert_eq!(left.buffered_len(), 0);
        assert_eq!(right.buffered_len(), 6);
    }

    #[test]
    fn send_without_transport_is_zero() {
        let node = PipeNode::new();
        assert_eq!(node.send(b"lost").unwrap(), 0);
    }

    #[test]
    fn bound_transport_feeds_receive() {
        let (transport, remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        node.set_transport(Some(transport.clone())).unwrap();
        let seen = recorder(&node);

        remote.push(b"hello");
        transport.poll(None).unwrap();

        assert_eq!(*seen.borrow(), vec![Bytes::from("hello")]);
        assert_eq!(node.buffered_len(), 5);
        assert_eq!(node.send(b"reply").unwrap(), 5);
        assert_eq!(remote.take_written(), Bytes::from("reply"));
    }

    #[test]
    fn short_transport_write_is_reported() {
        let (transport, remote) = MemoryEndpoint::transport();
        remote.set_write_limit(Some(2));
        let node = PipeNode::new();
        node.set_transport(Some(transport)).unwrap();

        assert_eq!(node.send(b"abcdef").unwrap(), 2);
        assert_eq!(remote.take_written(), Bytes::from("ab"));
    }

    #[test]
    fn rebinding_moves_the_subscription() {
        let (first, first_remote) = MemoryEndpoint::transport();
        let (second, _second_remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        let seen = recorder(&node);

        node.set_transport(Some(first.clone())).unwrap();
        node.set_transport(Some(second.clone())).unwrap();

        assert_eq!(first.subscriber_count(), 0);
        assert_eq!(first.owner(), None);
        assert_eq!(second.subscriber_count(), 1);
        assert!(node.is_bound_to(&second));

        first_remote.push(b"stale");
        first.poll(None).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn unbinding_clears_transport() {
        let (transport, _remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        node.set_transport(Some(transport.clone())).unwrap();
        node.set_transport(None).unwrap();

        assert!(node.transport().is_none());
        assert_eq!(transport.subscriber_count(), 0);
        assert_eq!(node.send(b"x").unwrap(), 0);
    }

    #[test]
    fn closed_transport_clears_binding_silently() {
        let (transport, remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        node.set_transport(Some(transport.clone())).unwrap();

        remote.finish();
        transport.poll(None).unwrap();

        assert!(transport.is_closed());
        assert!(node.transport().is_none());
        assert_eq!(node.send(b"after").unwrap(), 0);
        assert_eq!(transport.owner(), None);
    }

    #[test]
    fn close_notification_tears_down_like_unbinding() {
        let (transport, _remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        node.set_transport(Some(transport.clone())).unwrap();
        assert_eq!(transport.owner(), Some(node.id()));

        // Deliver the notification alone, without the hub's own reset.
        node.inner.on_closed(&transport);

        assert!(node.transport().is_none());
        assert_eq!(transport.owner(), None);
        assert_eq!(transport.subscriber_count(), 0);
        PipeNode::new().set_transport(Some(transport)).unwrap();
    }

    #[test]
    fn binding_a_closed_transport_fails() {
        let (transport, _remote) = MemoryEndpoint::transport();
        transport.close();
        let err = PipeNode::new().set_transport(Some(transport)).unwrap_err();
        assert!(matches!(err, PipeError::Transport(TransportError::Closed)));
    }

    #[test]
    fn transport_binds_to_one_node_at_a_time() {
        let (transport, _remote) = MemoryEndpoint::transport();
        let first = PipeNode::new();
        let second = PipeNode::new();

        first.set_transport(Some(transport.clone())).unwrap();
        let err = second.set_transport(Some(transport.clone())).unwrap_err();
        assert!(matches!(err, PipeError::TransportInUse(id) if id == transport.id()));

        first.set_transport(None).unwrap();
        second.set_transport(Some(transport.clone())).unwrap();
        assert_eq!(transport.owner(), Some(second.id()));
    }

    #[test]
    fn dropping_a_node_releases_its_transport() {
        let (transport, _remote) = MemoryEndpoint::transport();
        {
            let node = PipeNode::new();
            node.set_transport(Some(transport.clone())).unwrap();
            assert_eq!(transport.subscriber_count(), 1);
        }
        assert_eq!(transport.subscriber_count(), 0);
        assert_eq!(transport.owner(), None);
    }

    #[test]
    fn self_link_and_cycles_are_rejected() {
        let a = PipeNode::new();
        let b = PipeNode::new();
        let c = PipeNode::new();

        assert!(matches!(a.attach_sink(&a), Err(PipeError::Cycle)));

        a.attach_sink(&b).unwrap();
        b.attach_sink(&c).unwrap();
        assert!(matches!(b.attach_sink(&a), Err(PipeError::Cycle)));
        assert!(matches!(c.attach_sink(&a), Err(PipeError::Cycle)));
    }

    #[test]
    fn diamond_delivers_through_both_paths() {
        let top = PipeNode::new();
        let left = PipeNode::new();
        let right = PipeNode::new();
        let bottom = PipeNode::new();
        top.attach_sink(&left).unwrap();
        top.attach_sink(&right).unwrap();
        left.attach_sink(&bottom).unwrap();
        right.attach_sink(&bottom).unwrap();

        top.receive(Bytes::from_static(b"x"), None);
        assert_eq!(bottom.buffered_len(), 2);
    }

    #[test]
    fn duplicate_attach_is_ignored() {
        let source = PipeNode::new();
        let sink = PipeNode::new();
        source.attach_sink(&sink).unwrap();
        source.attach_sink(&sink).unwrap();

        source.receive(Bytes::from_static(b"once"), None);
        assert_eq!(source.sink_count(), 1);
        assert_eq!(sink.buffered_len(), 4);
    }

    #[test]
    fn dropped_sinks_are_pruned() {
        let source = PipeNode::new();
        let kept = PipeNode::new();
        source.attach_sink(&kept).unwrap();
        {
            let temporary = PipeNode::new();
            source.attach_sink(&temporary).unwrap();
            assert_eq!(source.sink_count(), 2);
        }
        assert_eq!(source.sink_count(), 1);
        source.receive(Bytes::from_static(b"ok"), None);
        assert_eq!(kept.buffered_len(), 2);
    }

    #[test]
    fn detach_sink_and_listener() {
        let source = PipeNode::new();
        let sink = PipeNode::new();
        source.attach_sink(&sink).unwrap();
        let id = source.attach_listener(|_| {});

        assert!(source.detach_sink(&sink));
        assert!(!source.detach_sink(&sink));
        assert!(source.detach_listener(id));
        assert!(!source.detach_listener(id));
        assert_eq!(source.sink_count(), 0);

        source.receive(Bytes::from_static(b"gone"), None);
        assert_eq!(sink.buffered_len(), 0);
    }

    #[test]
    fn listener_may_unbind_during_delivery() {
        let (transport, remote) = MemoryEndpoint::transport();
        let node = PipeNode::new();
        node.set_transport(Some(transport.clone())).unwrap();

        let handle = node.downgrade();
        node.attach_listener(move |_| {
            if let Some(node) = handle.upgrade() {
                node.set_transport(None).unwrap();
            }
        });

        remote.push(b"first");
        transport.poll(None).unwrap();
        remote.push(b"second");
        transport.poll(None).unwrap();

        assert_eq!(node.buffered_len(), 5);
        assert_eq!(transport.subscriber_count(), 0);
    }

    #[test]
    fn plain_node_does_not_forward() {
        let (transport, remote) = MemoryEndpoint::transport();
        let source = PipeNode::new();
        let node = PipeNode::new();
        node.set_transport(Some(transport)).unwrap();
        source.attach_sink(&node).unwrap();

        source.receive(Bytes::from_static(b"data"), None);
        assert!(remote.take_written().is_empty());
    }
}
