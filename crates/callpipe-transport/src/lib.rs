//! Opaque byte endpoints for the call pipe layer.
//!
//! Provides the transport contract every pipe adapter relies on:
//! - an [`Endpoint`] trait for concrete byte sources and sinks
//! - a shared [`Transport`] handle that turns endpoint readiness into
//!   "ready read" and "closed" notifications for subscribers
//! - an in-memory endpoint ([`MemoryEndpoint`]) and a threaded endpoint over
//!   blocking streams ([`StreamEndpoint`])
//!
//! This is the lowest layer of callpipe. Everything else builds on the
//! [`Transport`] type provided here.

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;
pub mod transport;

pub use error::{Result, TransportError};
pub use memory::{MemoryEndpoint, MemoryRemote};
pub use stream::StreamEndpoint;
pub use traits::{Endpoint, EndpointPoll};
pub use transport::{SubscriptionId, Transport, TransportListener};
