//! End-to-end rendezvous over real TCP through a running relay.

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use rendezvous_client::{ClientConfig, RelayClient};
use rendezvous_relay::{Config, Relay};
use rendezvous_types::TlsMode;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const RELAY_NAME: &str = "localhost";

struct Pki {
    dir: TempDir,
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
}

impl Pki {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "e2e ca");
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = params.self_signed(&ca_key).unwrap();
        std::fs::write(dir.path().join("ca.pem"), ca_cert.pem()).unwrap();
        Self {
            dir,
            ca_cert,
            ca_key,
        }
    }

    fn ca_path(&self) -> PathBuf {
        self.dir.path().join("ca.pem")
    }

    fn issue(&self, name: &str) -> (PathBuf, PathBuf) {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let cert_path = self.dir.path().join(format!("{name}-cert.pem"));
        let key_path = self.dir.path().join(format!("{name}-key.pem"));
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    fn client(&self, name: &str, relay: SocketAddr) -> RelayClient {
        let (cert_path, key_path) = self.issue(name);
        RelayClient::new(ClientConfig {
            relay_addr: relay.to_string(),
            server_name: RELAY_NAME.to_string(),
            ca_path: self.ca_path(),
            cert_path,
            key_path,
        })
        .unwrap()
    }
}

async fn start_relay(pki: &Pki) -> (Arc<Relay>, SocketAddr) {
    let (cert_path, key_path) = pki.issue(RELAY_NAME);
    let mut config = Config::default();
    config.tls.ca_path = pki.ca_path();
    config.tls.cert_path = cert_path;
    config.tls.key_path = key_path;
    config.server.ip = "127.0.0.1".to_string();
    config.server.port = 0;

    let relay = Arc::new(Relay::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(relay.clone().serve(listener));
    (relay, addr)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn two_parties_pair_and_exchange_bytes() {
    let pki = Pki::new();
    let (relay, addr) = start_relay(&pki).await;

    let alice = pki.client("alice", addr);
    let bob = pki.client("bob", addr);

    let waiting = tokio::spawn(async move { alice.connect("bob", "t1").await });
    wait_until(|| relay.total_pending() == 1).await;

    let mut bob_side = bob.connect("alice", "t1").await.unwrap();
    let mut alice_side = waiting.await.unwrap().unwrap();

    assert_eq!(alice_side.mode, TlsMode::Server);
    assert_eq!(bob_side.mode, TlsMode::Client);
    assert_eq!(relay.total_pending(), 0);

    alice_side.stream.write_all(b"hello bob").await.unwrap();
    let mut buf = [0u8; 9];
    bob_side.stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello bob");

    bob_side.stream.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    alice_side.stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hi");

    drop(alice_side);
    let mut rest = Vec::new();
    bob_side.stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    wait_until(|| relay.active_pairs() == 0).await;
    let metrics = relay.metrics();
    assert_eq!(metrics.pairings_total.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.bytes_forwarded.load(Ordering::Relaxed), 11);
    assert_eq!(relay.total_pending(), 0);
}

#[tokio::test]
async fn concurrent_pairs_each_get_complementary_roles() {
    let pki = Pki::new();
    let (relay, addr) = start_relay(&pki).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let left = pki.client(&format!("left{i}"), addr);
        let right = pki.client(&format!("right{i}"), addr);
        let left_peer = format!("right{i}");
        let right_peer = format!("left{i}");

        tasks.push(tokio::spawn(async move {
            let (a, b) = tokio::join!(
                left.connect(&left_peer, "concurrent"),
                right.connect(&right_peer, "concurrent"),
            );
            (a.unwrap(), b.unwrap())
        }));
    }

    for task in tasks {
        let (mut a, mut b) = task.await.unwrap();
        assert_ne!(a.mode, b.mode);

        a.stream.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        b.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"x");
    }

    assert_eq!(relay.total_pending(), 0);
    assert_eq!(relay.metrics().pairings_total.load(Ordering::Relaxed), 8);
}

#[tokio::test]
async fn failed_connection_does_not_disturb_others() {
    let pki = Pki::new();
    let (relay, addr) = start_relay(&pki).await;

    // Not TLS at all.
    let mut junk = TcpStream::connect(addr).await.unwrap();
    junk.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    let mut rest = Vec::new();
    let _ = junk.read_to_end(&mut rest).await;

    // Certificate from a CA the relay does not trust.
    let stranger = Pki::new();
    let (cert_path, key_path) = stranger.issue("mallory");
    let mallory = RelayClient::new(ClientConfig {
        relay_addr: addr.to_string(),
        server_name: RELAY_NAME.to_string(),
        ca_path: pki.ca_path(),
        cert_path,
        key_path,
    })
    .unwrap();
    assert!(mallory.connect("alice", "").await.is_err());

    wait_until(|| relay.metrics().handshake_failures.load(Ordering::Relaxed) == 2).await;
    assert_eq!(relay.total_pending(), 0);

    let alice = pki.client("alice", addr);
    let bob = pki.client("bob", addr);
    let (a, b) = tokio::join!(alice.connect("bob", ""), bob.connect("alice", ""));
    assert_ne!(a.unwrap().mode, b.unwrap().mode);
}

#[tokio::test]
async fn malformed_request_is_counted_and_dropped() {
    let pki = Pki::new();
    let (relay, addr) = start_relay(&pki).await;

    let (cert_path, key_path) = pki.issue("carol");
    let config = ClientConfig {
        relay_addr: addr.to_string(),
        server_name: RELAY_NAME.to_string(),
        ca_path: pki.ca_path(),
        cert_path,
        key_path,
    };
    let connector = rendezvous_client::connector(&config).unwrap();
    let server_name = rustls::pki_types::ServerName::try_from(RELAY_NAME).unwrap();

    let tcp = TcpStream::connect(addr).await.unwrap();
    let mut tls = connector.connect(server_name, tcp).await.unwrap();
    tls.write_all(b"{\"DestParty\": 42}").await.unwrap();
    tls.flush().await.unwrap();

    let mut rest = Vec::new();
    let _ = tls.read_to_end(&mut rest).await;
    assert!(rest.is_empty());

    wait_until(|| {
        relay
            .metrics()
            .authorization_failures
            .load(Ordering::Relaxed)
            == 1
    })
    .await;
    assert_eq!(relay.total_pending(), 0);
}
