use std::fmt;

/// Category of a bus error. Lets controllers tell a fatal setup problem
/// apart from a dropped sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid setup such as an unknown type or a schema mismatch. Permanent.
    Config,
    /// A bus resource could not be created.
    Resource,
    /// A sample could not be handed to the bus.
    Delivery,
    /// The bus (or the resource) has been shut down.
    Closed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Resource => f.write_str("resource"),
            ErrorKind::Delivery => f.write_str("delivery"),
            ErrorKind::Closed => f.write_str("closed"),
        }
    }
}

/// Error returned by every bus trait method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BusError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Resource, message: msg.into() }
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Delivery, message: msg.into() }
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Closed, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for BusError {}
