//! Error types for the coordination core.

use thiserror::Error;

/// Errors from talking to the coordinator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The coordinator loop has exited and no longer accepts events
    #[error("coordinator has stopped")]
    Stopped,
}

/// Why a delivery to a client channel did not happen.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection behind the channel is gone. The member is removed.
    #[error("client channel closed")]
    Closed,

    /// The connection's outbound queue is full. Only this delivery is dropped.
    #[error("client outbound queue full")]
    Full,
}

/// Errors from reading the next inbound frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The stream ended or can no longer be read
    #[error("connection closed: {0}")]
    Closed(String),

    /// One frame could not be understood; the stream is still usable
    #[error("unreadable frame: {0}")]
    Transient(String),
}

impl ReadError {
    /// Whether the reader must stop after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Failure writing to a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The connection can no longer be written to
    #[error("write failed: {0}")]
    Closed(String),

    /// One message could not be framed; nothing was written
    #[error("unencodable message: {0}")]
    Encode(String),
}

impl WriteError {
    /// Whether the writer must stop after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}
