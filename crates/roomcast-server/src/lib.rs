//! Roomcast production server.
//!
//! Wraps [`roomcast_core`]'s coordinator and connection supervisors with a
//! QUIC endpoint, the join handshake and the system environment.
//!
//! # Architecture
//!
//! ```text
//!   QuinnTransport::accept ──> handshake (Join / JoinAck) ──> ConnectionSupervisor::run
//!                                                                  │
//!                                                  CoordinatorHandle (shared by all)
//! ```
//!
//! Each accepted connection runs in its own task. The coordinator is created
//! by [`Server::bind`] and lives as long as the server.
//!
//! # Components
//!
//! - [`Server`]: accept loop, connection limit, per-connection tasks
//! - [`QuinnTransport`]: QUIC endpoint via Quinn
//! - [`QuicFrameReader`] / [`QuicFrameWriter`]: the core's transport seam
//!   over one QUIC stream
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]

mod error;
mod handshake;
mod stream;
mod system_env;
mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use error::ServerError;
pub use handshake::HandshakeError;
use roomcast_core::{ConnectionSupervisor, Coordinator, CoordinatorHandle, Environment, RelayConfig};
use roomcast_proto::{
    Payload,
    payloads::{ErrorPayload, session::JoinAck},
};
pub use stream::{QuicFrameReader, QuicFrameWriter};
pub use system_env::SystemEnv;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
pub use transport::{CLOSE_NORMAL, CLOSE_REJECTED, IncomingConnection, QuinnConnection, QuinnTransport};

/// Default time a new connection has to send its Join.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on concurrently open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Time allowed between connecting and sending Join
    pub join_timeout: Duration,
    /// Connections beyond this are refused with an Error frame
    pub max_connections: usize,
    /// Coordinator and supervisor tuning
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            relay: RelayConfig::default(),
        }
    }
}

/// Production Roomcast server.
pub struct Server {
    transport: QuinnTransport,
    coordinator: CoordinatorHandle,
    coordinator_task: JoinHandle<()>,
    env: SystemEnv,
    config: Arc<ServerRuntimeConfig>,
}

impl Server {
    /// Bind the endpoint and start the coordinator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".to_string()));
        }
        if config.relay.heartbeat_interval >= config.relay.pong_wait {
            tracing::warn!(
                heartbeat = ?config.relay.heartbeat_interval,
                pong_wait = ?config.relay.pong_wait,
                "heartbeat interval is not shorter than the read deadline; idle clients will time out"
            );
        }

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        let env = SystemEnv::new();
        let (coordinator, coordinator_task) =
            Coordinator::new(env.clone()).spawn(config.relay.event_queue_capacity);

        Ok(Self { transport, coordinator, coordinator_task, env, config: Arc::new(config) })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Handle to the running coordinator.
    pub fn coordinator(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    /// Accept connections until the endpoint closes.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes, then close every
    /// connection and wait for the coordinator to drain.
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let Self { transport, coordinator, coordinator_task, env, config } = self;
        tracing::info!(addr = %transport.local_addr()?, "server accepting connections");

        let slots = Arc::new(Semaphore::new(config.max_connections));
        tokio::pin!(shutdown);

        loop {
            let incoming = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    transport.close();
                    break;
                },
                incoming = transport.accept() => match incoming {
                    Some(incoming) => incoming,
                    None => break,
                },
            };

            let permit = Arc::clone(&slots).try_acquire_owned().ok();
            let coordinator = coordinator.clone();
            let env = env.clone();
            let config = Arc::clone(&config);

            tokio::spawn(async move {
                let remote = incoming.remote_addr();
                let connection = match incoming.establish().await {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::debug!(%remote, error = %e, "handshake failed");
                        return;
                    },
                };

                match permit {
                    Some(permit) => {
                        if let Err(e) =
                            handle_connection(connection, coordinator, env, &config, permit).await
                        {
                            tracing::debug!(%remote, error = %e, "connection ended with error");
                        }
                    },
                    None => {
                        tracing::warn!(%remote, max = config.max_connections, "connection limit reached");
                        refuse(connection, config.join_timeout).await;
                    },
                }
            });
        }

        // Closing the endpoint ends every supervisor, and with them the last
        // coordinator handles.
        drop(coordinator);
        coordinator_task
            .await
            .map_err(|e| ServerError::Internal(format!("coordinator task failed: {e}")))
    }
}

/// Run one connection from handshake to disconnect.
async fn handle_connection(
    connection: QuinnConnection,
    coordinator: CoordinatorHandle,
    env: SystemEnv,
    config: &ServerRuntimeConfig,
    _permit: OwnedSemaphorePermit,
) -> Result<(), ServerError> {
    let remote = connection.remote_addr();
    let max_payload = config.relay.max_payload_size;

    let (mut send, recv, join) =
        match handshake::accept_join(&connection, config.join_timeout, max_payload).await {
            Ok(joined) => joined,
            Err(e) => {
                tracing::info!(%remote, error = %e, "join rejected");
                connection.close_gracefully(CLOSE_REJECTED, "join rejected", handshake::REJECT_GRACE).await;
                return Err(e.into());
            },
        };

    let session_id = env.random_u64();
    stream::write_payload(&mut send, Payload::JoinAck(JoinAck { session_id })).await?;
    tracing::debug!(%remote, user_id = %join.user_id, room = %join.room, session_id, "join accepted");

    let supervisor = ConnectionSupervisor::new(
        session_id,
        &join.user_id,
        &join.room,
        QuicFrameReader::new(recv, max_payload),
        QuicFrameWriter::new(send, connection),
        coordinator,
        &config.relay,
    );
    let reason = supervisor.run().await;
    tracing::debug!(%remote, session_id, %reason, "connection closed");

    Ok(())
}

/// Turn away a connection over the limit.
async fn refuse(connection: QuinnConnection, wait: Duration) {
    if let Ok(Ok((mut send, _recv))) = tokio::time::timeout(wait, connection.accept_bi()).await {
        handshake::reject(&mut send, ErrorPayload::server_full()).await;
    }
    connection.close_gracefully(CLOSE_REJECTED, "server full", handshake::REJECT_GRACE).await;
}
