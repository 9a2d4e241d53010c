//! Per-connection supervision.
//!
//! A supervisor turns one accepted, joined connection into a room member:
//!
//! 1. registers the member with the coordinator
//! 2. spawns a writer task draining the member's outbound queue
//! 3. spawns a heartbeat task probing the peer on an interval
//! 4. reads inbound frames inline until the connection ends
//!
//! The connection ends when the peer closes, a frame cannot be read, or no
//! frame arrives within the read deadline. Every path submits an unregister;
//! the coordinator treats duplicates as no-ops.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{
    channel::{Outbound, OutboundQueue, queued_channel},
    config::RelayConfig,
    coordinator::CoordinatorHandle,
    error::{ReadError, WriteError},
    handle::ClientHandle,
};

/// One inbound frame, as far as the core cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Opaque message for the room
    Payload(Bytes),
    /// Answer to a heartbeat probe
    Pong,
}

/// Read side of a connection.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Wait for the next inbound frame.
    ///
    /// `ReadError::Transient` skips one frame; `ReadError::Closed` ends the
    /// connection.
    async fn recv(&mut self) -> Result<Inbound, ReadError>;
}

/// Write side of a connection.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Write one delivery.
    async fn deliver(&mut self, outbound: &Outbound) -> Result<(), WriteError>;

    /// Write a liveness probe.
    async fn ping(&mut self) -> Result<(), WriteError>;

    /// Close the connection. Must tolerate being called on a dead connection.
    async fn close(&mut self, reason: &str);
}

/// Why a supervised connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer closed or the stream failed
    Closed(String),
    /// Nothing arrived within the read deadline
    TimedOut,
    /// The coordinator is gone
    CoordinatorStopped,
}

impl std::fmt::Display for Disconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed(reason) => write!(f, "closed: {reason}"),
            Self::TimedOut => write!(f, "read deadline exceeded"),
            Self::CoordinatorStopped => write!(f, "relay shutting down"),
        }
    }
}

/// Owns the lifecycle of one connection.
pub struct ConnectionSupervisor<R, W> {
    handle: ClientHandle,
    outbound: OutboundQueue,
    reader: R,
    writer: W,
    coordinator: CoordinatorHandle,
    heartbeat_interval: Duration,
    pong_wait: Duration,
}

impl<R: FrameReader, W: FrameWriter> ConnectionSupervisor<R, W> {
    /// Prepare supervision for a joined connection.
    pub fn new(
        session_id: u64,
        user_id: &str,
        room: &str,
        reader: R,
        writer: W,
        coordinator: CoordinatorHandle,
        config: &RelayConfig,
    ) -> Self {
        let (channel, outbound) = queued_channel(config.outbound_queue_capacity);
        Self {
            handle: ClientHandle::new(session_id, user_id, room, channel),
            outbound,
            reader,
            writer,
            coordinator,
            heartbeat_interval: config.heartbeat_interval,
            pong_wait: config.pong_wait,
        }
    }

    /// Handle this connection will be registered under.
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Run until the connection ends.
    pub async fn run(self) -> Disconnect {
        let Self { handle, outbound, mut reader, mut writer, coordinator, heartbeat_interval, pong_wait } =
            self;

        if coordinator.register(handle.clone()).await.is_err() {
            writer.close("relay shutting down").await;
            return Disconnect::CoordinatorStopped;
        }

        let writer = Arc::new(Mutex::new(writer));
        let write_task = tokio::spawn(write_loop(Arc::clone(&writer), outbound, handle.clone()));
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            writer,
            handle.clone(),
            coordinator.clone(),
            heartbeat_interval,
        ));

        let reason = read_loop(&mut reader, &handle, &coordinator, pong_wait).await;
        tracing::info!(
            user_id = handle.user_id(),
            room = handle.room(),
            session_id = handle.session_id(),
            reason = %reason,
            "connection ended"
        );

        if let Err(e) = coordinator.unregister(handle.clone()).await {
            tracing::debug!(session_id = handle.session_id(), error = %e, "unregister not delivered");
        }
        heartbeat_task.abort();
        // Closing the channel stops the writer, which closes the transport.
        handle.close();
        if let Err(e) = write_task.await {
            tracing::error!(session_id = handle.session_id(), error = %e, "writer task failed");
        }

        reason
    }
}

async fn read_loop<R: FrameReader>(
    reader: &mut R,
    handle: &ClientHandle,
    coordinator: &CoordinatorHandle,
    pong_wait: Duration,
) -> Disconnect {
    loop {
        let inbound = match tokio::time::timeout(pong_wait, reader.recv()).await {
            Err(_elapsed) => return Disconnect::TimedOut,
            Ok(Err(ReadError::Closed(reason))) => return Disconnect::Closed(reason),
            Ok(Err(ReadError::Transient(reason))) => {
                tracing::warn!(session_id = handle.session_id(), reason = %reason, "skipping unreadable frame");
                continue;
            },
            Ok(Ok(inbound)) => inbound,
        };

        match inbound {
            Inbound::Payload(payload) => {
                if coordinator.broadcast(handle, payload).await.is_err() {
                    return Disconnect::CoordinatorStopped;
                }
            },
            Inbound::Pong => {
                tracing::trace!(session_id = handle.session_id(), "pong");
            },
        }
    }
}

async fn write_loop<W: FrameWriter>(
    writer: Arc<Mutex<W>>,
    mut outbound: OutboundQueue,
    handle: ClientHandle,
) {
    while let Some(message) = outbound.next().await {
        // A peer that stops draining its stream must not pin the writer once
        // the connection is closed.
        let result = tokio::select! {
            biased;
            () = outbound.closed() => break,
            result = async { writer.lock().await.deliver(&message).await } => result,
        };
        match result {
            Ok(()) => {},
            Err(e) if e.is_fatal() => {
                tracing::warn!(session_id = handle.session_id(), error = %e, "delivery write failed");
                break;
            },
            Err(e) => {
                tracing::warn!(
                    session_id = handle.session_id(),
                    sender = %message.sender,
                    bytes = message.payload.len(),
                    error = %e,
                    "skipping undeliverable message"
                );
            },
        }
    }
    outbound.close();
    writer.lock().await.close("connection closed").await;
}

async fn heartbeat_loop<W: FrameWriter>(
    writer: Arc<Mutex<W>>,
    handle: ClientHandle,
    coordinator: CoordinatorHandle,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let result = writer.lock().await.ping().await;
        if let Err(e) = result {
            tracing::warn!(session_id = handle.session_id(), error = %e, "heartbeat failed");
            if let Err(stopped) = coordinator.unregister(handle.clone()).await {
                tracing::debug!(session_id = handle.session_id(), error = %stopped, "unregister not delivered");
            }
            handle.close();
            return;
        }
    }
}
