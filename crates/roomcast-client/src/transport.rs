//! QUIC plumbing for the client.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use quinn::{ClientConfig, Endpoint, ReadExactError, RecvStream, SendStream};
use roomcast_proto::{ALPN_PROTOCOL, Frame, FrameHeader, Payload};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the QUIC connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server refused the join.
    #[error("rejected by server (code {code}): {message}")]
    Rejected {
        /// Error code from the server
        code: u16,
        /// Human-readable reason
        message: String,
    },

    /// The connection has ended.
    #[error("connection closed: {0}")]
    Closed(String),
}

impl From<roomcast_proto::ProtocolError> for TransportError {
    fn from(err: roomcast_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Open a QUIC connection to `server_addr`.
pub(crate) async fn connect(
    server_addr: SocketAddr,
    idle_timeout: Duration,
) -> Result<(Endpoint, quinn::Connection), TransportError> {
    let local: SocketAddr = if server_addr.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };

    let mut endpoint = Endpoint::client(local)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(insecure_client_config(idle_timeout)?);

    let connection = endpoint
        .connect(server_addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    Ok((endpoint, connection))
}

/// Read one complete frame.
pub(crate) async fn read_frame(recv: &mut RecvStream) -> Result<Frame, TransportError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    recv.read_exact(&mut header_buf).await.map_err(stream_error)?;
    let header = *FrameHeader::from_bytes(&header_buf)?;

    let mut payload = vec![0u8; header.payload_size() as usize];
    recv.read_exact(&mut payload).await.map_err(stream_error)?;

    Ok(Frame::new(header, payload))
}

/// Encode and write one payload.
pub(crate) async fn write_payload(
    send: &mut SendStream,
    payload: Payload,
) -> Result<(), TransportError> {
    let bytes = payload.into_frame()?.to_vec()?;
    send.write_all(&bytes).await.map_err(|e| TransportError::Stream(format!("write failed: {e}")))
}

fn stream_error(err: ReadExactError) -> TransportError {
    match err {
        ReadExactError::FinishedEarly(_) => TransportError::Closed("stream finished".to_string()),
        ReadExactError::ReadError(quinn::ReadError::ConnectionLost(reason)) => {
            TransportError::Closed(reason.to_string())
        },
        ReadExactError::ReadError(e) => TransportError::Stream(e.to_string()),
    }
}

/// Create an insecure client config that accepts any certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config(idle_timeout: Duration) -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    // Must match server's ALPN protocol
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("invalid TLS config: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(crypto));

    let mut transport = quinn::TransportConfig::default();
    let idle = idle_timeout
        .try_into()
        .map_err(|e| TransportError::Connection(format!("invalid idle timeout: {e}")))?;
    transport.max_idle_timeout(Some(idle));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
