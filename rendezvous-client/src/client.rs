//! Relay client: TLS setup, authorization and role assignment.

use rendezvous_types::pem::{load_certificates, load_private_key, PemError};
use rendezvous_types::{AuthRequest, Ready, TlsMode, WireError};
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Upper bound on the size of a `Ready` message.
const MAX_READY_SIZE: usize = 64;

/// Errors that can occur while rendezvousing through the relay.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Certificate, key or CA file could not be loaded.
    #[error("failed to load {path}: {reason}")]
    Load {
        /// File that failed to load.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// Relay server name is not a valid DNS name or IP address.
    #[error("invalid relay server name: {0}")]
    InvalidServerName(String),

    /// TCP connection to the relay failed.
    #[error("connection to {addr} failed: {source}")]
    Connect {
        /// Relay address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TLS handshake with the relay failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Relay closed the session without assigning a role.
    #[error("relay closed the session before sending Ready")]
    ClosedBeforeReady,

    /// Relay sent data where it should have closed TLS.
    #[error("unexpected data after Ready")]
    UnexpectedData,

    /// Message encoding or decoding failed.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the relay is and which credentials to present.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay `host:port`.
    pub relay_addr: String,
    /// Name the relay certificate is issued for.
    pub server_name: String,
    /// CA that issued the relay certificate.
    pub ca_path: PathBuf,
    /// This party's certificate chain.
    pub cert_path: PathBuf,
    /// This party's private key.
    pub key_path: PathBuf,
}

/// A completed rendezvous: the plain stream to the peer and our role.
#[derive(Debug)]
pub struct Rendezvous {
    /// TCP stream, now forwarded byte-for-byte to the peer.
    pub stream: TcpStream,
    /// Role for the end-to-end TLS session.
    pub mode: TlsMode,
}

/// Connects to the relay on behalf of one party.
#[derive(Clone)]
pub struct RelayClient {
    config: ClientConfig,
    connector: TlsConnector,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RelayClient {
    /// Load credentials and build the TLS connector.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = connector(&config)?;
        Ok(Self { config, connector })
    }

    /// Ask the relay to pair us with `destination` under `tag`.
    ///
    /// Resolves once the peer has arrived and the relay has closed TLS.
    pub async fn connect(&self, destination: &str, tag: &str) -> Result<Rendezvous, ClientError> {
        let addr = &self.config.relay_addr;
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tracing::debug!(addr = %addr, peer = destination, tag, "Connected to relay");

        let request = AuthRequest::new(destination, tag);
        let (stream, ready) =
            rendezvous(tcp, &self.connector, &self.config.server_name, &request).await?;

        tracing::info!(peer = destination, tag, mode = ?ready.mode, "Peer ready");
        Ok(Rendezvous {
            stream,
            mode: ready.mode,
        })
    }
}

/// Build a TLS connector that trusts the relay CA and presents this
/// party's certificate.
pub fn connector(config: &ClientConfig) -> Result<TlsConnector, ClientError> {
    let mut roots = RootCertStore::empty();
    for ca in load_certificates(&config.ca_path)? {
        roots
            .add(ca)
            .map_err(|e| ClientError::Config(format!("invalid CA certificate: {}", e)))?;
    }
    let certs = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Config(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| ClientError::Config(e.to_string()))?;

    Ok(TlsConnector::from(Arc::new(tls)))
}

/// Run the rendezvous protocol over an already connected transport.
///
/// Performs the TLS handshake, sends `request`, waits for `Ready`, then
/// answers the relay's `close_notify` with our own. The transport is handed
/// back positioned at the first byte of the peer stream.
pub async fn rendezvous<S>(
    stream: S,
    connector: &TlsConnector,
    server_name: &str,
    request: &AuthRequest,
) -> Result<(S, Ready), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| ClientError::InvalidServerName(e.to_string()))?;

    let mut tls = connector
        .connect(name, stream)
        .await
        .map_err(|e| ClientError::Handshake(e.to_string()))?;

    tls.write_all(&request.to_bytes()?).await?;
    tls.flush().await?;

    let mut buf = Vec::with_capacity(MAX_READY_SIZE);
    let mut chunk = [0u8; MAX_READY_SIZE];
    let ready = loop {
        let n = tls.read(&mut chunk).await?;
        if n == 0 {
            return Err(ClientError::ClosedBeforeReady);
        }
        buf.extend_from_slice(&chunk[..n]);

        match Ready::from_bytes(&buf) {
            Ok(ready) => break ready,
            Err(e) if e.is_incomplete() && buf.len() < MAX_READY_SIZE => continue,
            Err(e) => return Err(e.into()),
        }
    };

    // The relay follows Ready with close_notify and nothing else.
    if tls.read(&mut chunk).await? != 0 {
        return Err(ClientError::UnexpectedData);
    }
    tls.get_mut().1.send_close_notify();
    tls.flush().await?;

    let (stream, _) = tls.into_inner();
    Ok((stream, ready))
}

impl From<PemError> for ClientError {
    fn from(e: PemError) -> Self {
        ClientError::Load {
            path: e.path,
            reason: e.reason,
        }
    }
}
