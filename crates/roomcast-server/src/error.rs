//! Server error types.

use std::fmt;

use roomcast_core::CoordinatorError;
use roomcast_proto::ProtocolError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable TLS files, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (connection failure, stream reset, etc.).
    ///
    /// Affects one connection unless raised while binding the endpoint.
    Transport(String),

    /// Protocol error (malformed frame, bad join, etc.).
    ///
    /// The client sent something we cannot accept. Fatal for that connection,
    /// the server keeps serving everyone else.
    Protocol(String),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen. Indicates a bug.
    Internal(String),

    /// The coordinator loop is gone.
    ///
    /// Only happens during shutdown.
    Coordinator(CoordinatorError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Coordinator(err) => write!(f, "coordinator error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Coordinator(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CoordinatorError> for ServerError {
    fn from(err: CoordinatorError) -> Self {
        Self::Coordinator(err)
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn protocol_errors_convert() {
        let err: ServerError = ProtocolError::InvalidMagic.into();
        assert_eq!(err.to_string(), "protocol error: invalid magic number");
    }

    #[test]
    fn coordinator_error_is_the_source() {
        let err: ServerError = CoordinatorError::Stopped.into();
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "coordinator error: coordinator has stopped");
    }
}
