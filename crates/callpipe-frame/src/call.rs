use tracing::debug;

use crate::value::Value;

/// Maximum number of positional arguments a call carries.
pub const MAX_ARGS: usize = 8;

/// A named call with up to [`MAX_ARGS`] positional arguments.
///
/// Constructors silently drop arguments past the eighth; the wire format
/// encodes the count in a single byte capped at eight.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    name: String,
    args: Vec<Value>,
}

impl Call {
    /// Create a call with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Create a call from positional arguments, keeping at most the first eight.
    pub fn with_args<I, V>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut call = Self::new(name);
        let mut dropped = 0usize;
        for arg in args {
            if !call.push_arg(arg) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(call = %call.name, dropped, "discarded arguments past the eighth");
        }
        call
    }

    /// Builder form of [`Call::push_arg`].
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.push_arg(value);
        self
    }

    /// Append an argument. Returns false, discarding it, if the call is full.
    pub fn push_arg(&mut self, value: impl Into<Value>) -> bool {
        if self.args.len() >= MAX_ARGS {
            return false;
        }
        self.args.push(value.into());
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.name, self.args)
    }
}
