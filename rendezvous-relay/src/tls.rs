//! TLS context and per-connection TLS session.
//!
//! The relay terminates TLS only long enough to learn who a party is and to
//! tell it when its peer is ready. After the handshake the stream is split
//! into the raw transport and a [`TlsSession`] holding the TLS state, so the
//! two can be parked in separate tables and the transport can later be
//! forwarded without TLS.
//!
//! Reads after the handshake are record-precise: exactly one TLS record is
//! pulled off the transport at a time. Once the peer's `close_notify` has
//! been seen nothing beyond it has been consumed, so the next byte on the
//! transport is the first byte of the forwarded stream.

use crate::config::TlsConfig;
use crate::error::{ProtocolError, ProtocolResult, TlsError};
use rendezvous_types::pem;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// TLS record header length.
const RECORD_HEADER_LEN: usize = 5;

/// Largest record body we accept (2^14 plaintext plus expansion).
const MAX_RECORD_LEN: usize = 16384 + 2048;

/// Load certificates from a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    pem::load_certificates(path).map_err(|e| TlsError::CertLoad {
        path: e.path,
        reason: e.reason,
    })
}

/// Load a private key (RSA, PKCS8 or EC) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    pem::load_private_key(path).map_err(|e| TlsError::KeyLoad {
        path: e.path,
        reason: e.reason,
    })
}

/// Build the relay's rustls server configuration.
///
/// Parties must present a certificate that chains to the peer CA.
pub fn server_config(config: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certificates(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let mut roots = RootCertStore::empty();
    for ca in load_certificates(config.peer_ca())? {
        roots
            .add(ca)
            .map_err(|e| TlsError::Config(format!("invalid peer CA certificate: {}", e)))?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| TlsError::Config(format!("Failed to build client verifier: {}", e)))?;

    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::Config(format!("Failed to set protocol versions: {}", e)))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::Config(format!("Failed to build TLS config: {}", e)))?;

    Ok(Arc::new(server_config))
}

/// Build the acceptor used by the listener.
pub fn build_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    Ok(TlsAcceptor::from(server_config(config)?))
}

/// TLS state of one party connection, detached from its transport.
///
/// Every I/O method takes the transport explicitly.
pub struct TlsSession {
    conn: ServerConnection,
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("server_name", &self.conn.server_name())
            .field("handshaking", &self.conn.is_handshaking())
            .finish_non_exhaustive()
    }
}

impl TlsSession {
    /// Wrap an established server connection.
    pub fn new(conn: ServerConnection) -> Self {
        Self { conn }
    }

    /// Split a completed handshake into transport and session.
    pub fn split<T>(stream: TlsStream<T>) -> (T, Self) {
        let (io, conn) = stream.into_inner();
        (io, Self::new(conn))
    }

    /// Certificates the peer presented, leaf first.
    pub fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.conn.peer_certificates()
    }

    /// Server name the peer asked for via SNI.
    pub fn server_name(&self) -> Option<&str> {
        self.conn.server_name()
    }

    /// Write any pending TLS records to the transport.
    pub async fn flush<T>(&mut self, io: &mut T) -> ProtocolResult<()>
    where
        T: AsyncWrite + Unpin,
    {
        while self.conn.wants_write() {
            let mut out = Vec::new();
            self.conn.write_tls(&mut out)?;
            io.write_all(&out).await?;
        }
        io.flush().await?;
        Ok(())
    }

    /// Read exactly one TLS record from the transport and process it.
    async fn read_record<T>(&mut self, io: &mut T) -> ProtocolResult<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut header = [0u8; RECORD_HEADER_LEN];
        read_exact_or_closed(io, &mut header).await?;

        let len = u16::from_be_bytes([header[3], header[4]]) as usize;
        if len > MAX_RECORD_LEN {
            return Err(ProtocolError::InvalidMessage {
                reason: format!("TLS record too large: {} bytes", len),
            });
        }

        let mut record = vec![0u8; RECORD_HEADER_LEN + len];
        record[..RECORD_HEADER_LEN].copy_from_slice(&header);
        read_exact_or_closed(io, &mut record[RECORD_HEADER_LEN..]).await?;

        let mut rd = &record[..];
        while !rd.is_empty() {
            self.conn.read_tls(&mut rd)?;
            if let Err(e) = self.conn.process_new_packets() {
                // Best effort: let the peer see the alert.
                let _ = self.flush(io).await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Read decrypted application data.
    ///
    /// Returns `Ok(0)` once the peer has sent `close_notify`.
    pub async fn read<T>(&mut self, io: &mut T, buf: &mut [u8]) -> ProtocolResult<usize>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.flush(io).await?;
                    self.read_record(io).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Encrypt and send application data.
    pub async fn write_all<T>(&mut self, io: &mut T, data: &[u8]) -> ProtocolResult<()>
    where
        T: AsyncWrite + Unpin,
    {
        self.conn.writer().write_all(data)?;
        self.flush(io).await
    }

    /// Send `close_notify`. The transport stays open.
    pub async fn close<T>(&mut self, io: &mut T) -> ProtocolResult<()>
    where
        T: AsyncWrite + Unpin,
    {
        self.conn.send_close_notify();
        self.flush(io).await
    }

    /// Wait for the peer's `close_notify`.
    ///
    /// Application data in its place is an error.
    pub async fn await_close<T>(&mut self, io: &mut T) -> ProtocolResult<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = [0u8; 256];
        match self.read(io, &mut buf).await? {
            0 => Ok(()),
            _ => Err(ProtocolError::UnexpectedData),
        }
    }
}

async fn read_exact_or_closed<T>(io: &mut T, buf: &mut [u8]) -> ProtocolResult<()>
where
    T: AsyncRead + Unpin,
{
    match io.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => Err(e.into()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use rendezvous_client::connector;
    use rustls::pki_types::ServerName;

    #[test]
    fn missing_cert_file_is_cert_load_error() {
        let err = load_certificates(Path::new("/nonexistent/cert.pem")).unwrap_err();
        assert!(matches!(err, TlsError::CertLoad { .. }));
    }

    #[test]
    fn missing_key_file_is_key_load_error() {
        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(matches!(err, TlsError::KeyLoad { .. }));
    }

    #[test]
    fn empty_pem_has_no_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "").unwrap();

        match load_certificates(&path).unwrap_err() {
            TlsError::CertLoad { path: failed, reason } => {
                assert_eq!(failed, path);
                assert!(reason.contains("no certificates"));
            }
            other => panic!("expected CertLoad, got {:?}", other),
        }
    }

    #[test]
    fn server_config_builds_from_pem_files() {
        let pki = TestPki::new();
        assert!(server_config(&pki.relay_tls_config()).is_ok());
    }

    #[tokio::test]
    async fn session_round_trip_and_close_leaves_transport_clean() {
        let pki = TestPki::new();
        let acceptor = pki.acceptor();
        let party = pki.party("alice", "unused:0");
        let connector = connector(&party).unwrap();

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);

        let server = tokio::spawn(async move {
            let tls = acceptor.accept(server_io).await.unwrap();
            let (mut io, mut session) = TlsSession::split(tls);

            let mut buf = [0u8; 64];
            let n = session.read(&mut io, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"ping");

            session.write_all(&mut io, b"pong").await.unwrap();
            session.close(&mut io).await.unwrap();
            session.await_close(&mut io).await.unwrap();

            // Plaintext sent after the TLS close must still be on the wire.
            let mut plain = [0u8; 5];
            io.read_exact(&mut plain).await.unwrap();
            assert_eq!(&plain, b"plain");
        });

        let name = ServerName::try_from(RELAY_NAME).unwrap();
        let mut tls = connector.connect(name, client_io).await.unwrap();
        tls.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        tls.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        let mut rest = Vec::new();
        tls.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        tls.get_mut().1.send_close_notify();
        tls.flush().await.unwrap();
        let (mut io, _) = tls.into_inner();
        io.write_all(b"plain").await.unwrap();

        server.await.unwrap();
    }
}
