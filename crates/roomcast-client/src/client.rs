//! Room client.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use quinn::{Endpoint, RecvStream, SendStream, VarInt};
use roomcast_proto::{
    Payload,
    payloads::{
        ErrorPayload,
        relay::Delivery,
        session::{Goodbye, Join},
    },
};
use tokio::{
    sync::{Mutex, mpsc},
    task::AbortHandle,
};

use crate::transport::{self, TransportError};

/// Application close code the client uses when hanging up.
const CLOSE_CODE: u32 = 0;

/// Capacity of the queue between the reader task and [`RoomClient`].
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Client behaviour knobs.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Answer the server's Ping frames with Pong.
    ///
    /// Disabling this makes the server drop the client after its read
    /// deadline unless the client keeps sending messages.
    pub answer_pings: bool,
    /// QUIC idle timeout.
    pub idle_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { answer_pings: true, idle_timeout: Duration::from_secs(30) }
    }
}

/// Something the server sent after the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A message from another member (or `"system"`)
    Delivery(Delivery),
    /// The server reported an error
    Error(ErrorPayload),
    /// The connection ended; no further events follow
    Closed(String),
}

/// A client joined to one room.
pub struct RoomClient {
    session_id: u64,
    send: Arc<Mutex<SendStream>>,
    events: mpsc::Receiver<ClientEvent>,
    connection: quinn::Connection,
    reader: AbortHandle,
    _endpoint: Endpoint,
}

impl RoomClient {
    /// Connect to `server` and join `room` as `user_id`.
    pub async fn join(
        server: SocketAddr,
        user_id: &str,
        room: &str,
    ) -> Result<Self, TransportError> {
        Self::join_with(server, user_id, room, ClientOptions::default()).await
    }

    /// Connect and join with explicit options.
    ///
    /// # Errors
    ///
    /// - `TransportError::Rejected` if the server refused the join (empty
    ///   fields, server full)
    /// - `TransportError::Connection` / `TransportError::Stream` on network
    ///   failure
    pub async fn join_with(
        server: SocketAddr,
        user_id: &str,
        room: &str,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        let (endpoint, connection) = transport::connect(server, options.idle_timeout).await?;
        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(format!("open_bi failed: {e}")))?;

        let join = Join { user_id: user_id.to_string(), room: room.to_string() };
        transport::write_payload(&mut send, Payload::Join(join)).await?;

        let session_id = match Payload::from_frame(transport::read_frame(&mut recv).await?)? {
            Payload::JoinAck(ack) => ack.session_id,
            Payload::Error(error) => {
                connection.close(VarInt::from_u32(CLOSE_CODE), b"rejected");
                return Err(TransportError::Rejected { code: error.code, message: error.message });
            },
            other => {
                connection.close(VarInt::from_u32(CLOSE_CODE), b"protocol error");
                return Err(TransportError::Protocol(format!(
                    "expected JoinAck, got {:?}",
                    other.opcode()
                )));
            },
        };
        tracing::debug!(user_id, room, session_id, "joined");

        let send = Arc::new(Mutex::new(send));
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let reader =
            tokio::spawn(read_loop(recv, Arc::clone(&send), events_tx, options.answer_pings));

        Ok(Self {
            session_id,
            send,
            events,
            connection,
            reader: reader.abort_handle(),
            _endpoint: endpoint,
        })
    }

    /// Session identifier assigned by the server.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Send an opaque message to the room.
    pub async fn send(&self, content: impl Into<Bytes>) -> Result<(), TransportError> {
        let mut send = self.send.lock().await;
        transport::write_payload(&mut send, Payload::Message(content.into())).await
    }

    /// Next event from the server, or `None` after [`ClientEvent::Closed`].
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Next delivery, skipping server error reports.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` once the connection has ended
    pub async fn next_delivery(&mut self) -> Result<Delivery, TransportError> {
        loop {
            match self.events.recv().await {
                Some(ClientEvent::Delivery(delivery)) => return Ok(delivery),
                Some(ClientEvent::Error(error)) => {
                    tracing::warn!(code = error.code, message = %error.message, "server error");
                },
                Some(ClientEvent::Closed(reason)) => return Err(TransportError::Closed(reason)),
                None => return Err(TransportError::Closed("reader stopped".to_string())),
            }
        }
    }

    /// Leave the room gracefully.
    pub async fn leave(self, reason: &str) -> Result<(), TransportError> {
        let result = {
            let mut send = self.send.lock().await;
            let goodbye = Payload::Goodbye(Goodbye { reason: reason.to_string() });
            let written = transport::write_payload(&mut send, goodbye).await;
            let _ = send.finish();
            written
        };
        // Wait for the server to close, so the Goodbye is not discarded.
        let _ = tokio::time::timeout(Duration::from_secs(2), self.connection.closed()).await;
        self.shutdown(b"bye");
        result
    }

    /// Drop the connection without saying goodbye.
    pub fn disconnect(self) {
        self.shutdown(b"");
    }

    fn shutdown(&self, reason: &[u8]) {
        self.reader.abort();
        self.connection.close(VarInt::from_u32(CLOSE_CODE), reason);
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut recv: RecvStream,
    send: Arc<Mutex<SendStream>>,
    events: mpsc::Sender<ClientEvent>,
    answer_pings: bool,
) {
    let reason = loop {
        let frame = match transport::read_frame(&mut recv).await {
            Ok(frame) => frame,
            Err(e) => break e.to_string(),
        };

        let event = match Payload::from_frame(frame) {
            Ok(Payload::Delivery(delivery)) => ClientEvent::Delivery(delivery),
            Ok(Payload::Error(error)) => ClientEvent::Error(error),
            Ok(Payload::Goodbye(goodbye)) => break goodbye.reason,
            Ok(Payload::Ping) => {
                if answer_pings {
                    let mut send = send.lock().await;
                    if let Err(e) = transport::write_payload(&mut send, Payload::Pong).await {
                        break e.to_string();
                    }
                }
                continue;
            },
            Ok(other) => {
                tracing::debug!(opcode = ?other.opcode(), "ignoring unexpected frame");
                continue;
            },
            Err(e) => {
                tracing::debug!(error = %e, "ignoring undecodable frame");
                continue;
            },
        };

        if events.send(event).await.is_err() {
            return;
        }
    };

    let _ = events.send(ClientEvent::Closed(reason)).await;
}
