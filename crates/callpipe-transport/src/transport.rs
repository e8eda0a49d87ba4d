use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{Endpoint, EndpointPoll};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Receives transport notifications.
///
/// Callbacks run with no transport borrow held, so a listener may read from,
/// write to, subscribe to or unsubscribe from the transport it is called for.
pub trait TransportListener {
    /// New inbound bytes are available.
    fn on_ready_read(&self, transport: &Transport);

    /// The transport was closed. Fired at most once per transport.
    fn on_closed(&self, transport: &Transport);
}

/// Handle returned by [`Transport::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    listener: Weak<dyn TransportListener>,
}

struct Shared {
    id: u64,
    kind: &'static str,
    endpoint: RefCell<Box<dyn Endpoint>>,
    subscriptions: RefCell<Vec<Subscription>>,
    next_subscription: Cell<u64>,
    closed: Cell<bool>,
    owner: Cell<Option<u64>>,
}

/// Shared, single-thread handle to an endpoint plus its notification hub.
///
/// Cloning is cheap; every clone refers to the same endpoint. The handle is
/// `!Send`: events from other threads must be marshaled onto the owning thread
/// before they reach it (see [`StreamEndpoint`](crate::StreamEndpoint)).
#[derive(Clone)]
pub struct Transport {
    shared: Rc<Shared>,
}

impl Transport {
    /// Wrap an endpoint.
    pub fn new(endpoint: impl Endpoint + 'static) -> Self {
        let kind = endpoint.kind();
        let id = NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(transport = id, kind, "transport created");
        Self {
            shared: Rc::new(Shared {
                id,
                kind,
                endpoint: RefCell::new(Box::new(endpoint)),
                subscriptions: RefCell::new(Vec::new()),
                next_subscription: Cell::new(1),
                closed: Cell::new(false),
                owner: Cell::new(None),
            }),
        }
    }

    /// Process-unique transport id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Endpoint name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.shared.kind
    }

    /// True if both handles refer to the same transport.
    pub fn ptr_eq(&self, other: &Transport) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.get()
    }

    /// Register a listener for ready-read and closed notifications.
    ///
    /// Listeners are held weakly; dropped listeners are pruned on the next
    /// notification.
    pub fn subscribe(&self, listener: Weak<dyn TransportListener>) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_subscription.get());
        self.shared.next_subscription.set(id.0 + 1);
        self.shared
            .subscriptions
            .borrow_mut()
            .push(Subscription { id, listener });
        trace!(transport = self.shared.id, subscription = id.0, "subscribed");
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.shared.subscriptions.borrow_mut();
        let before = subs.len();
        subs.retain(|sub| sub.id != id);
        let removed = subs.len() != before;
        if removed {
            trace!(transport = self.shared.id, subscription = id.0, "unsubscribed");
        }
        removed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscriptions
            .borrow()
            .iter()
            .filter(|sub| sub.listener.strong_count() > 0)
            .count()
    }

    /// Mark the transport as bound to the pipe node `owner`.
    ///
    /// Returns false if another owner already holds it. Re-claiming by the
    /// current owner succeeds.
    pub fn claim(&self, owner: u64) -> bool {
        match self.shared.owner.get() {
            Some(current) if current != owner => false,
            _ => {
                self.shared.owner.set(Some(owner));
                true
            }
        }
    }

    /// Drop the claim held by `owner`, if any.
    pub fn release(&self, owner: u64) {
        if self.shared.owner.get() == Some(owner) {
            self.shared.owner.set(None);
        }
    }

    /// The pipe node currently bound to this transport.
    pub fn owner(&self) -> Option<u64> {
        self.shared.owner.get()
    }

    pub fn bytes_available(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.shared.endpoint.borrow().bytes_available()
    }

    /// Read up to `max` available bytes.
    pub fn read(&self, max: usize) -> Result<Bytes> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.shared.endpoint.borrow_mut().read(max)
    }

    /// Read everything currently available.
    pub fn read_available(&self) -> Result<Bytes> {
        let available = self.bytes_available();
        if available == 0 {
            return Ok(Bytes::new());
        }
        self.read(available)
    }

    /// Write `data`, returning how many bytes the endpoint accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let written = self.shared.endpoint.borrow_mut().write(data)?;
        trace!(
            transport = self.shared.id,
            requested = data.len(),
            written,
            "transport write"
        );
        Ok(written)
    }

    pub fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.shared.endpoint.borrow_mut().flush()
    }

    /// Poll the endpoint and dispatch the result.
    ///
    /// `Ready` notifies every subscriber, `Eof` closes the transport. With
    /// `wait` set, blocks for at most that long if the endpoint supports it.
    pub fn poll(&self, wait: Option<Duration>) -> Result<EndpointPoll> {
        if self.is_closed() {
            return Ok(EndpointPoll::Eof);
        }
        let outcome = self.shared.endpoint.borrow_mut().poll(wait)?;
        match outcome {
            EndpointPoll::Ready(_) => self.notify_ready_read(),
            EndpointPoll::Eof => self.close(),
            EndpointPoll::Idle => {}
        }
        Ok(outcome)
    }

    /// Tell every subscriber that inbound bytes are available.
    pub fn notify_ready_read(&self) {
        if self.is_closed() {
            return;
        }
        for listener in self.live_listeners() {
            listener.on_ready_read(self);
        }
    }

    /// Close the transport and notify subscribers once.
    ///
    /// Subscriptions are dropped before listeners are called.
    pub fn close(&self) {
        if self.shared.closed.replace(true) {
            return;
        }
        debug!(transport = self.shared.id, kind = self.shared.kind, "transport closed");
        let listeners = self.live_listeners();
        self.shared.subscriptions.borrow_mut().clear();
        self.shared.owner.set(None);
        for listener in listeners {
            listener.on_closed(self);
        }
    }

    fn live_listeners(&self) -> Vec<Rc<dyn TransportListener>> {
        let mut subs = self.shared.subscriptions.borrow_mut();
        subs.retain(|sub| sub.listener.strong_count() > 0);
        subs.iter().filter_map(|sub| sub.listener.upgrade()).collect()
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("closed", &self.shared.closed.get())
            .finish()
    }
}
