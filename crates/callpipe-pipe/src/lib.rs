//! Composable byte pipes that carry call frames.
//!
//! A [`PipeNode`] buffers inbound chunks and broadcasts each one to every
//! attached sink. Adapters build on it: [`DelegatePipe`] relays to a bound
//! transport, [`LinePipe`] splits text into lines, [`StdioPipe`] bridges
//! blocking standard streams. [`CallChannel`] runs the incremental frame
//! decoder over any of them.
//!
//! Everything here is single-threaded: handles are `Rc`-based and `!Send`.

pub mod channel;
pub mod delegate;
pub mod error;
pub mod line;
pub mod node;
pub mod stdio;
pub mod traits;

pub use channel::CallChannel;
pub use delegate::DelegatePipe;
pub use error::{PipeError, Result};
pub use line::LinePipe;
pub use node::{ListenerId, PipeNode, WeakPipeNode};
pub use stdio::StdioPipe;
pub use traits::Pipe;
