use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};
use callpipe_transport::Transport;
use tracing::trace;

use crate::error::Result;
use crate::node::{ListenerId, PipeNode};
use crate::traits::Pipe;

const NEWLINE: u8 = b'\n';

type LineListener = Rc<dyn Fn(&Bytes)>;

#[derive(Default)]
struct LineHub {
    listeners: RefCell<Vec<(ListenerId, LineListener)>>,
    next_id: Cell<u64>,
}

/// A pipe node that splits inbound bytes into `\n`-terminated lines.
///
/// The node's buffer doubles as the line buffer: complete lines are taken
/// from its front and emitted without the delimiter, and a trailing partial
/// line stays buffered until the rest arrives.
#[derive(Clone)]
pub struct LinePipe {
    node: PipeNode,
    hub: Rc<LineHub>,
}

impl LinePipe {
    pub fn new() -> Self {
        let node = PipeNode::with_kind("line", false);
        let hub = Rc::new(LineHub::default());

        let weak = node.downgrade();
        let lines = Rc::clone(&hub);
        node.attach_listener(move |chunk| {
            if !chunk.contains(&NEWLINE) {
                return;
            }
            let Some(node) = weak.upgrade() else {
                return;
            };
            for line in node.with_buffer(split_lines) {
                lines.emit(&line);
            }
        });

        Self { node, hub }
    }

    /// Create a line pipe reading from `transport`.
    pub fn bind(transport: Transport) -> Result<Self> {
        let pipe = Self::new();
        pipe.node.set_transport(Some(transport))?;
        Ok(pipe)
    }

    /// Register a callback for each complete line, delimiter stripped.
    pub fn on_line(&self, callback: impl Fn(&Bytes) + 'static) -> ListenerId {
        let id = ListenerId::from_raw(self.hub.next_id.get());
        self.hub.next_id.set(self.hub.next_id.get() + 1);
        self.hub
            .listeners
            .borrow_mut()
            .push((id, Rc::new(callback)));
        id
    }

    pub fn remove_line_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.hub.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(current, _)| *current != id);
        listeners.len() != before
    }

    /// Send `data` as exactly one line.
    ///
    /// Every `\n` inside `data` is removed and a single one appended, so one
    /// call puts one terminated line on the wire. Returns the bytes accepted.
    pub fn send_line(&self, data: &[u8]) -> Result<usize> {
        let mut line = BytesMut::with_capacity(data.len() + 1);
        for chunk in data.split(|b| *b == NEWLINE) {
            line.put_slice(chunk);
        }
        line.put_u8(NEWLINE);
        self.node.send(&line)
    }

    /// Length of the buffered partial line.
    pub fn pending_partial(&self) -> usize {
        self.node.buffered_len()
    }

    pub fn node(&self) -> &PipeNode {
        &self.node
    }
}

impl Default for LinePipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe for LinePipe {
    fn node(&self) -> &PipeNode {
        &self.node
    }

    fn send(&self, data: &[u8]) -> Result<usize> {
        self.node.send(data)
    }
}

impl std::fmt::Debug for LinePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePipe")
            .field("node", &self.node)
            .field("line_listeners", &self.hub.listeners.borrow().len())
            .finish()
    }
}

impl LineHub {
    fn emit(&self, line: &Bytes) {
        let listeners: Vec<LineListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();
        for callback in listeners {
            callback(line);
        }
    }
}

fn split_lines(buffer: &mut BytesMut) -> Vec<Bytes> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == NEWLINE) {
        let mut line = buffer.split_to(pos + 1);
        line.truncate(pos);
        lines.push(line.freeze());
    }
    if !lines.is_empty() {
        trace!(lines = lines.len(), partial = buffer.len(), "split lines");
    }
    lines
}
