//! Framed I/O on a QUIC bidirectional stream.
//!
//! After the join handshake the stream is split: [`QuicFrameReader`] feeds the
//! connection supervisor's reader, [`QuicFrameWriter`] carries deliveries and
//! heartbeats back to the client.

use async_trait::async_trait;
use quinn::{ReadExactError, RecvStream, SendStream};
use roomcast_core::{FrameReader, FrameWriter, Inbound, Outbound, ReadError, WriteError};
use roomcast_proto::{
    Frame, FrameHeader, Payload,
    payloads::relay::Delivery,
};

use crate::{
    error::ServerError,
    transport::{CLOSE_NORMAL, QuinnConnection},
};

/// Read one complete frame.
///
/// Every error leaves the stream unusable: either the stream itself failed
/// or the header could not be trusted to find the next frame boundary.
pub(crate) async fn read_frame(
    recv: &mut RecvStream,
    max_payload: usize,
) -> Result<Frame, ServerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    recv.read_exact(&mut header_buf).await.map_err(stream_error)?;
    let header = *FrameHeader::from_bytes(&header_buf)?;

    let payload_size = header.payload_size() as usize;
    if payload_size > max_payload {
        return Err(ServerError::Protocol(format!(
            "payload of {payload_size} bytes exceeds limit of {max_payload}"
        )));
    }

    let mut payload = vec![0u8; payload_size];
    recv.read_exact(&mut payload).await.map_err(stream_error)?;

    Ok(Frame::new(header, payload))
}

/// Encode and write one payload.
pub(crate) async fn write_payload(
    send: &mut SendStream,
    payload: Payload,
) -> Result<(), ServerError> {
    let bytes = payload.into_frame()?.to_vec()?;
    send.write_all(&bytes)
        .await
        .map_err(|e| ServerError::Transport(format!("write failed: {e}")))
}

fn stream_error(err: ReadExactError) -> ServerError {
    match err {
        ReadExactError::FinishedEarly(0) => ServerError::Transport("stream finished".to_string()),
        ReadExactError::FinishedEarly(read) => {
            ServerError::Transport(format!("stream finished mid-frame after {read} bytes"))
        },
        ReadExactError::ReadError(e) => ServerError::Transport(e.to_string()),
    }
}

/// Client-to-server half of a joined connection.
pub struct QuicFrameReader {
    recv: RecvStream,
    max_payload: usize,
}

impl QuicFrameReader {
    /// Wrap the receive half of the client's stream.
    pub fn new(recv: RecvStream, max_payload: usize) -> Self {
        Self { recv, max_payload }
    }
}

#[async_trait]
impl FrameReader for QuicFrameReader {
    async fn recv(&mut self) -> Result<Inbound, ReadError> {
        let frame = read_frame(&mut self.recv, self.max_payload)
            .await
            .map_err(|e| ReadError::Closed(e.to_string()))?;

        match Payload::from_frame(frame) {
            Ok(Payload::Message(content)) if content.len() > Delivery::MAX_CONTENT_SIZE => {
                Err(ReadError::Transient(format!(
                    "message of {} bytes exceeds relay limit of {}",
                    content.len(),
                    Delivery::MAX_CONTENT_SIZE
                )))
            },
            Ok(Payload::Message(content)) => Ok(Inbound::Payload(content)),
            // A client-initiated ping proves liveness just as well.
            Ok(Payload::Pong | Payload::Ping) => Ok(Inbound::Pong),
            Ok(Payload::Goodbye(goodbye)) => {
                Err(ReadError::Closed(format!("goodbye: {}", goodbye.reason)))
            },
            Ok(other) => Err(ReadError::Transient(format!("unexpected {:?} frame", other.opcode()))),
            Err(e) => Err(ReadError::Transient(e.to_string())),
        }
    }
}

/// Server-to-client half of a joined connection.
pub struct QuicFrameWriter {
    send: SendStream,
    connection: QuinnConnection,
}

impl QuicFrameWriter {
    /// Wrap the send half of the client's stream.
    pub fn new(send: SendStream, connection: QuinnConnection) -> Self {
        Self { send, connection }
    }
}

#[async_trait]
impl FrameWriter for QuicFrameWriter {
    async fn deliver(&mut self, outbound: &Outbound) -> Result<(), WriteError> {
        let delivery = Delivery {
            sender: outbound.sender.to_string(),
            content: outbound.payload.to_vec(),
        };
        let bytes = Payload::Delivery(delivery)
            .into_frame()
            .and_then(|frame| frame.to_vec())
            .map_err(|e| WriteError::Encode(e.to_string()))?;
        self.send.write_all(&bytes).await.map_err(|e| WriteError::Closed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), WriteError> {
        write_payload(&mut self.send, Payload::Ping)
            .await
            .map_err(|e| WriteError::Closed(e.to_string()))
    }

    async fn close(&mut self, reason: &str) {
        // Already finished or reset when the connection died first.
        let _ = self.send.finish();
        self.connection.close(CLOSE_NORMAL, reason);
    }
}
