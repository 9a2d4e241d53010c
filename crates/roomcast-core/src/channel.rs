//! Per-connection delivery channels.
//!
//! The coordinator never blocks on a slow client: [`ClientChannel::deliver`]
//! is synchronous and either enqueues, reports the queue full, or reports the
//! connection gone. [`QueuedChannel`] is the production implementation, a
//! bounded queue drained by the connection's writer task.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::sync::{
    Notify,
    mpsc::{self, error::TrySendError},
};

use crate::error::DeliveryError;

/// A message on its way to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Attributed sender (a user id, or `"system"`)
    pub sender: Arc<str>,
    /// Opaque payload, forwarded unmodified
    pub payload: Bytes,
}

impl Outbound {
    /// Create an outbound message.
    pub fn new(sender: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        Self { sender: sender.into(), payload: payload.into() }
    }
}

/// Outbound side of one client connection, as seen by the coordinator.
pub trait ClientChannel: Send + Sync + 'static {
    /// Push a message without blocking.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Closed` if the connection is gone
    /// - `DeliveryError::Full` if the connection is not keeping up
    fn deliver(&self, outbound: Outbound) -> Result<(), DeliveryError>;

    /// Tell the connection to shut down. Idempotent.
    fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Single waiter (the writer); notify_one stores a permit if it is
            // not currently parked.
            self.notify.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Producer half of a bounded per-connection queue.
#[derive(Clone)]
pub struct QueuedChannel {
    tx: mpsc::Sender<Outbound>,
    signal: Arc<CloseSignal>,
}

impl fmt::Debug for QueuedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedChannel")
            .field("capacity", &self.tx.max_capacity())
            .field("closed", &self.signal.is_closed())
            .finish()
    }
}

impl ClientChannel for QueuedChannel {
    fn deliver(&self, outbound: Outbound) -> Result<(), DeliveryError> {
        if self.signal.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(outbound).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.signal.close();
    }

    fn is_closed(&self) -> bool {
        self.signal.is_closed() || self.tx.is_closed()
    }
}

/// Consumer half of a bounded per-connection queue.
///
/// Dropping it makes every later delivery fail with `DeliveryError::Closed`.
pub struct OutboundQueue {
    rx: mpsc::Receiver<Outbound>,
    signal: Arc<CloseSignal>,
}

impl fmt::Debug for OutboundQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("pending", &self.rx.len())
            .field("closed", &self.signal.is_closed())
            .finish()
    }
}

impl OutboundQueue {
    /// Wait for the next message.
    ///
    /// Returns `None` once the channel has been closed; messages still queued
    /// at that point are discarded.
    pub async fn next(&mut self) -> Option<Outbound> {
        if self.signal.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.signal.notify.notified() => None,
            message = self.rx.recv() => message,
        }
    }

    /// Resolve once the channel has been closed by either side.
    ///
    /// Cancel-safe, so a writer can race it against a write in flight.
    pub async fn closed(&self) {
        while !self.signal.is_closed() {
            self.signal.notify.notified().await;
        }
    }

    /// Take the next message if one is queued.
    pub fn try_next(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Number of messages waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no messages are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Mark the channel closed from the consumer side.
    pub fn close(&mut self) {
        self.signal.close();
        self.rx.close();
    }

    /// Whether the channel has been closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }
}

/// Create a bounded delivery channel.
///
/// A capacity of zero is raised to one.
#[must_use]
pub fn queued_channel(capacity: usize) -> (QueuedChannel, OutboundQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let signal = Arc::new(CloseSignal::default());
    (QueuedChannel { tx, signal: Arc::clone(&signal) }, OutboundQueue { rx, signal })
}
