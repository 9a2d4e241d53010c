//! Connection supervision over an in-memory transport.
//!
//! Each test wires one or more `ConnectionSupervisor`s to a running
//! coordinator through a fake connection whose far end the test drives.
//! Heartbeat and deadline tests run on a paused clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use roomcast_core::{
    ConnectionSupervisor, Coordinator, CoordinatorHandle, Disconnect, Environment, FrameReader,
    FrameWriter, Inbound, Outbound, ReadError, RelayConfig, WriteError,
};
use tokio::sync::{mpsc, watch};

#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Written {
    Delivery { sender: String, payload: Bytes },
    Ping,
    Closed,
}

struct MemReader {
    inbound: mpsc::UnboundedReceiver<Result<Inbound, ReadError>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl FrameReader for MemReader {
    async fn recv(&mut self) -> Result<Inbound, ReadError> {
        tokio::select! {
            _ = self.closed.wait_for(|closed| *closed) => Err(ReadError::Closed("closed locally".into())),
            next = self.inbound.recv() => next.unwrap_or_else(|| Err(ReadError::Closed("eof".into()))),
        }
    }
}

struct MemWriter {
    written: mpsc::UnboundedSender<Written>,
    closed: watch::Sender<bool>,
    ping_fails: Arc<AtomicBool>,
}

#[async_trait]
impl FrameWriter for MemWriter {
    async fn deliver(&mut self, outbound: &Outbound) -> Result<(), WriteError> {
        self.written
            .send(Written::Delivery { sender: outbound.sender.to_string(), payload: outbound.payload.clone() })
            .map_err(|_| WriteError::Closed("peer gone".into()))
    }

    async fn ping(&mut self) -> Result<(), WriteError> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(WriteError::Closed("ping refused".into()));
        }
        self.written.send(Written::Ping).map_err(|_| WriteError::Closed("peer gone".into()))
    }

    async fn close(&mut self, _reason: &str) {
        if !*self.closed.borrow() {
            let _ = self.written.send(Written::Closed);
        }
        self.closed.send_replace(true);
    }
}

/// Writer for a peer that accepts the connection but never drains it.
struct StuckWriter {
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameWriter for StuckWriter {
    async fn deliver(&mut self, _outbound: &Outbound) -> Result<(), WriteError> {
        std::future::pending().await
    }

    async fn ping(&mut self) -> Result<(), WriteError> {
        std::future::pending().await
    }

    async fn close(&mut self, _reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Writer whose deliveries of `oversized` cannot be encoded.
struct PickyWriter {
    inner: MemWriter,
    oversized: &'static [u8],
}

#[async_trait]
impl FrameWriter for PickyWriter {
    async fn deliver(&mut self, outbound: &Outbound) -> Result<(), WriteError> {
        if outbound.payload == self.oversized {
            return Err(WriteError::Encode("frame too large".into()));
        }
        self.inner.deliver(outbound).await
    }

    async fn ping(&mut self) -> Result<(), WriteError> {
        self.inner.ping().await
    }

    async fn close(&mut self, reason: &str) {
        self.inner.close(reason).await;
    }
}

/// Far end of a fake connection.
struct Peer {
    inbound: mpsc::UnboundedSender<Result<Inbound, ReadError>>,
    written: mpsc::UnboundedReceiver<Written>,
    ping_fails: Arc<AtomicBool>,
}

impl Peer {
    fn send(&self, payload: &'static [u8]) {
        self.inbound.send(Ok(Inbound::Payload(Bytes::from_static(payload)))).unwrap();
    }

    fn fail(&self, error: ReadError) {
        self.inbound.send(Err(error)).unwrap();
    }

    async fn next_delivery(&mut self) -> (String, Bytes) {
        loop {
            let written = tokio::time::timeout(Duration::from_secs(5), self.written.recv())
                .await
                .expect("timed out waiting for a delivery")
                .expect("connection writer dropped");
            if let Written::Delivery { sender, payload } = written {
                return (sender, payload);
            }
        }
    }

    fn drain(&mut self) -> Vec<Written> {
        std::iter::from_fn(|| self.written.try_recv().ok()).collect()
    }
}

fn connection() -> (MemReader, MemWriter, Peer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (written_tx, written_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(false);
    let ping_fails = Arc::new(AtomicBool::new(false));
    (
        MemReader { inbound: inbound_rx, closed: closed_rx },
        MemWriter { written: written_tx, closed: closed_tx, ping_fails: Arc::clone(&ping_fails) },
        Peer { inbound: inbound_tx, written: written_rx, ping_fails },
    )
}

fn supervise(
    session: u64,
    user: &str,
    room: &str,
    coordinator: &CoordinatorHandle,
    config: &RelayConfig,
) -> (tokio::task::JoinHandle<Disconnect>, Peer) {
    let (reader, writer, peer) = connection();
    let supervisor =
        ConnectionSupervisor::new(session, user, room, reader, writer, coordinator.clone(), config);
    (tokio::spawn(supervisor.run()), peer)
}

async fn wait_for_members(coordinator: &CoordinatorHandle, room: &str, expected: &[&str]) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = coordinator.snapshot().await.unwrap();
            let members = snapshot.members(room).map(<[String]>::to_vec).unwrap_or_default();
            if members == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("membership never converged");
}

#[tokio::test]
async fn two_member_room_lifecycle() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (u1_task, mut u1) = supervise(1, "U1", "R", &coordinator, &config);
    wait_for_members(&coordinator, "R", &["U1"]).await;

    let (u2_task, mut u2) = supervise(2, "U2", "R", &coordinator, &config);
    assert_eq!(u1.next_delivery().await, ("system".into(), Bytes::from("Welcome U2 to room R!")));

    u1.send(b"hi");
    // U2's first delivery is U1's message, not its own welcome.
    assert_eq!(u2.next_delivery().await, ("U1".into(), Bytes::from_static(b"hi")));

    u2.fail(ReadError::Closed("connection reset".into()));
    assert_eq!(u2_task.await.unwrap(), Disconnect::Closed("connection reset".into()));
    wait_for_members(&coordinator, "R", &["U1"]).await;

    u1.fail(ReadError::Closed("goodbye".into()));
    u1_task.await.unwrap();
    let snapshot = coordinator.snapshot().await.unwrap();
    assert!(!snapshot.contains_room("R"));

    let leftovers = u1.drain();
    assert!(!leftovers.iter().any(|w| matches!(w, Written::Delivery { payload, .. } if payload == "hi")));
    assert!(leftovers.contains(&Written::Closed));
}

#[tokio::test]
async fn transient_read_errors_keep_the_connection() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (_listener_task, mut listener) = supervise(1, "listener", "R", &coordinator, &config);
    wait_for_members(&coordinator, "R", &["listener"]).await;
    let (_talker_task, talker) = supervise(2, "talker", "R", &coordinator, &config);
    listener.next_delivery().await;

    talker.fail(ReadError::Transient("undecodable frame".into()));
    talker.send(b"still here");
    assert_eq!(listener.next_delivery().await, ("talker".into(), Bytes::from_static(b"still here")));
}

#[tokio::test]
async fn closing_the_handle_ends_the_connection() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (reader, writer, mut peer) = connection();
    let supervisor = ConnectionSupervisor::new(9, "alice", "R", reader, writer, coordinator.clone(), &config);
    let handle = supervisor.handle().clone();
    let task = tokio::spawn(supervisor.run());
    wait_for_members(&coordinator, "R", &["alice"]).await;

    coordinator.unregister(handle).await.unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(matches!(reason, Disconnect::Closed(_)));
    assert!(peer.drain().contains(&Written::Closed));
}

#[tokio::test]
async fn stopped_coordinator_refuses_registration() {
    let config = RelayConfig::default();
    let (coordinator, task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);
    task.abort();
    let _ = task.await;

    let (supervisor_task, mut peer) = supervise(1, "alice", "R", &coordinator, &config);
    assert_eq!(supervisor_task.await.unwrap(), Disconnect::CoordinatorStopped);
    assert_eq!(peer.drain(), vec![Written::Closed]);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_hits_read_deadline() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let started = tokio::time::Instant::now();
    let (task, mut peer) = supervise(1, "alice", "R", &coordinator, &config);
    assert_eq!(task.await.unwrap(), Disconnect::TimedOut);
    assert!(started.elapsed() >= config.pong_wait);

    let written = peer.drain();
    assert!(written.contains(&Written::Ping));
    assert!(written.contains(&Written::Closed));
    assert_eq!(coordinator.snapshot().await.unwrap().room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_the_member_alive() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (task, peer) = supervise(1, "alice", "R", &coordinator, &config);
    let Peer { inbound, mut written, .. } = peer;
    let responder = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(w) = written.recv().await {
            if w == Written::Ping {
                pings += 1;
                if inbound.send(Ok(Inbound::Pong)).is_err() {
                    break;
                }
            }
        }
        pings
    });

    tokio::time::sleep(config.pong_wait * 6).await;
    let snapshot = coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.members("R").unwrap(), ["alice"]);
    assert!(!task.is_finished());

    task.abort();
    let _ = task.await;
    responder.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_unregisters_before_deadline() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let started = tokio::time::Instant::now();
    let (task, peer) = supervise(1, "alice", "R", &coordinator, &config);
    peer.ping_fails.store(true, Ordering::SeqCst);

    let reason = task.await.unwrap();
    assert!(matches!(reason, Disconnect::Closed(_)), "unexpected {reason:?}");
    assert!(started.elapsed() < config.pong_wait);
    assert_eq!(coordinator.snapshot().await.unwrap().room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stuck_writer_does_not_outlive_the_connection() {
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (reader, _writer, _peer) = connection();
    let closed = Arc::new(AtomicBool::new(false));
    let writer = StuckWriter { closed: Arc::clone(&closed) };
    let supervisor =
        ConnectionSupervisor::new(1, "stuck", "R", reader, writer, coordinator.clone(), &config);
    let task = tokio::spawn(supervisor.run());
    wait_for_members(&coordinator, "R", &["stuck"]).await;

    // The welcome for "other" parks the stuck member's writer mid-delivery.
    let (_other_task, _other) = supervise(2, "other", "R", &coordinator, &config);
    wait_for_members(&coordinator, "R", &["other", "stuck"]).await;

    let reason = tokio::time::timeout(Duration::from_secs(3600), task)
        .await
        .expect("supervisor outlived its connection")
        .unwrap();
    assert_eq!(reason, Disconnect::TimedOut);
    assert!(closed.load(Ordering::SeqCst));
    let snapshot = coordinator.snapshot().await.unwrap();
    assert!(snapshot.members("R").is_none_or(|members| !members.iter().any(|m| m == "stuck")));
}

#[tokio::test]
async fn unencodable_delivery_is_skipped_for_that_member_only() {
    const OVERSIZED: &[u8] = b"far too large";
    let config = RelayConfig::default();
    let (coordinator, _task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (reader, writer, mut listener) = connection();
    let writer = PickyWriter { inner: writer, oversized: OVERSIZED };
    let supervisor =
        ConnectionSupervisor::new(1, "listener", "R", reader, writer, coordinator.clone(), &config);
    let _listener_task = tokio::spawn(supervisor.run());
    wait_for_members(&coordinator, "R", &["listener"]).await;

    let (_talker_task, talker) = supervise(2, "talker", "R", &coordinator, &config);
    listener.next_delivery().await;

    talker.send(OVERSIZED);
    talker.send(b"small");
    assert_eq!(listener.next_delivery().await, ("talker".into(), Bytes::from_static(b"small")));
    assert!(!listener.drain().contains(&Written::Closed));
    wait_for_members(&coordinator, "R", &["listener", "talker"]).await;
}

#[tokio::test]
async fn coordinator_stopping_mid_connection_still_ends_cleanly() {
    let config = RelayConfig::default();
    let (coordinator, task) = Coordinator::new(TestEnv).spawn(config.event_queue_capacity);

    let (supervisor_task, mut peer) = supervise(1, "alice", "R", &coordinator, &config);
    wait_for_members(&coordinator, "R", &["alice"]).await;
    task.abort();
    let _ = task.await;

    peer.fail(ReadError::Closed("connection reset".into()));
    let reason = tokio::time::timeout(Duration::from_secs(5), supervisor_task).await.unwrap().unwrap();
    assert_eq!(reason, Disconnect::Closed("connection reset".into()));
    assert!(peer.drain().contains(&Written::Closed));
    assert!(coordinator.is_stopped());
}
