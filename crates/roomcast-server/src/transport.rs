//! Quinn-based QUIC transport.
//!
//! Binds the relay's UDP endpoint with TLS 1.3, using PEM certificates when
//! configured and a freshly generated self-signed certificate otherwise. ALPN
//! is set to [`ALPN_PROTOCOL`] so only Roomcast clients complete the
//! handshake.
//!
//! Self-signed certificates are only suitable for local testing.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig, VarInt};
use roomcast_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// Application close code for an orderly close.
pub const CLOSE_NORMAL: u32 = 0;

/// Application close code for a connection turned away (bad join, server
/// full).
pub const CLOSE_REJECTED: u32 = 1;

/// QUIC transport using Quinn.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are both provided they are used for TLS.
    /// Otherwise a self-signed certificate for `localhost` is generated.
    pub fn bind(
        address: &str,
        cert_path: Option<&str>,
        key_path: Option<&str>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!(%addr, "QUIC transport bound");

        Ok(Self { endpoint })
    }

    /// Wait for the next incoming connection attempt.
    ///
    /// Returns `None` once the endpoint has been closed. The TLS handshake is
    /// not awaited here so one slow client cannot stall the accept loop.
    pub async fn accept(&self) -> Option<IncomingConnection> {
        self.endpoint.accept().await.map(|incoming| IncomingConnection { incoming })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }

    /// Stop accepting and close every connection.
    pub fn close(&self) {
        self.endpoint.close(VarInt::from_u32(CLOSE_NORMAL), b"server shutting down");
    }
}

/// A connection attempt whose handshake has not completed yet.
pub struct IncomingConnection {
    incoming: quinn::Incoming,
}

impl IncomingConnection {
    /// Peer address of the attempt.
    pub fn remote_addr(&self) -> SocketAddr {
        self.incoming.remote_address()
    }

    /// Complete the QUIC/TLS handshake.
    pub async fn establish(self) -> Result<QuinnConnection, ServerError> {
        let connection = self
            .incoming
            .await
            .map_err(|e| ServerError::Transport(format!("connection failed: {e}")))?;
        Ok(QuinnConnection { connection })
    }
}

/// An established QUIC connection.
///
/// Clones are cheap and share the same underlying connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept the client's bidirectional stream.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an application code and reason.
    ///
    /// Unsent stream data is discarded.
    pub fn close(&self, code: u32, reason: &str) {
        self.connection.close(VarInt::from_u32(code), reason.as_bytes());
    }

    /// Give the peer up to `grace` to read what was sent and hang up, then
    /// close.
    ///
    /// Used after an Error frame: closing right away could discard the frame
    /// before the client has read it.
    pub async fn close_gracefully(&self, code: u32, reason: &str, grace: Duration) {
        let _ = tokio::time::timeout(grace, self.connection.closed()).await;
        self.close(code, reason);
    }
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;

    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::Config(format!("no certificates found in '{cert_path}'")));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config(format!("no private key found in '{key_path}'")))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    quic_server_config(tls_config)
}

/// Generate a self-signed certificate for testing.
fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key.into())
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tracing::warn!("using self-signed certificate, not for production use");

    quic_server_config(tls_config)
}

fn quic_server_config(mut tls_config: rustls::ServerConfig) -> Result<ServerConfig, ServerError> {
    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
        .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?;

    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn transport_binds_with_self_signed() {
        let transport = QuinnTransport::bind("127.0.0.1:0", None, None).unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "Should have assigned a port");
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = QuinnTransport::bind("invalid:address:format", None, None);
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn transport_loads_pem_files() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(generated.cert.pem().as_bytes()).unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        key.write_all(generated.key_pair.serialize_pem().as_bytes()).unwrap();

        let transport = QuinnTransport::bind(
            "127.0.0.1:0",
            cert.path().to_str(),
            key.path().to_str(),
        );
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn transport_rejects_missing_key() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(b"not a certificate").unwrap();

        let result = QuinnTransport::bind(
            "127.0.0.1:0",
            cert.path().to_str(),
            Some("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
