//! Join handshake.
//!
//! The client opens one bidirectional stream and sends a Join frame naming
//! its user id and room. The server answers with JoinAck, or with an Error
//! frame followed by a close.

use std::time::Duration;

use quinn::{RecvStream, SendStream};
use roomcast_proto::{
    Opcode, Payload,
    payloads::{ErrorPayload, session::Join},
};
use thiserror::Error;

use crate::{
    error::ServerError,
    stream::{read_frame, write_payload},
    transport::QuinnConnection,
};

/// How long a rejected client gets to read the Error frame and hang up.
pub(crate) const REJECT_GRACE: Duration = Duration::from_secs(1);

/// Why a connection never became a room member.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No Join arrived in time
    #[error("no join within {0:?}")]
    TimedOut(Duration),

    /// Join with an empty user id or room
    #[error("join is missing user_id or room")]
    Incomplete,

    /// Join with a user id longer than `Join::MAX_USER_ID_LEN`
    #[error("user_id of {0} bytes exceeds limit of {max}", max = Join::MAX_USER_ID_LEN)]
    UserIdTooLong(usize),

    /// First frame was not a Join
    #[error("expected Join, got {0:?}")]
    Unexpected(Opcode),

    /// Stream or frame failure before the join completed
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl From<HandshakeError> for ServerError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Server(inner) => inner,
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Wait for the client's stream and a valid Join on it.
///
/// On an invalid join the client is sent an Error frame before this returns.
pub(crate) async fn accept_join(
    connection: &QuinnConnection,
    join_timeout: Duration,
    max_payload: usize,
) -> Result<(SendStream, RecvStream, Join), HandshakeError> {
    tokio::time::timeout(join_timeout, read_join(connection, max_payload))
        .await
        .map_err(|_| HandshakeError::TimedOut(join_timeout))?
}

async fn read_join(
    connection: &QuinnConnection,
    max_payload: usize,
) -> Result<(SendStream, RecvStream, Join), HandshakeError> {
    let (mut send, mut recv) = connection.accept_bi().await?;
    let frame = read_frame(&mut recv, max_payload).await?;

    let payload = match Payload::from_frame(frame) {
        Ok(payload) => payload,
        Err(e) => {
            reject(&mut send, ErrorPayload::invalid_payload(e.to_string())).await;
            return Err(ServerError::from(e).into());
        },
    };

    match payload {
        Payload::Join(join) if join.is_complete() && join.user_id_fits() => Ok((send, recv, join)),
        Payload::Join(join) => {
            let err = if join.is_complete() {
                HandshakeError::UserIdTooLong(join.user_id.len())
            } else {
                HandshakeError::Incomplete
            };
            reject(&mut send, ErrorPayload::invalid_join(err.to_string())).await;
            Err(err)
        },
        other => {
            let err = HandshakeError::Unexpected(other.opcode());
            reject(&mut send, ErrorPayload::invalid_join(err.to_string())).await;
            Err(err)
        },
    }
}

/// Send an Error frame and finish the stream.
///
/// The caller closes the connection, normally with
/// [`QuinnConnection::close_gracefully`].
pub(crate) async fn reject(send: &mut SendStream, error: ErrorPayload) {
    if let Err(e) = write_payload(send, Payload::Error(error)).await {
        tracing::debug!(error = %e, "failed to send rejection");
        return;
    }
    let _ = send.finish();
}
