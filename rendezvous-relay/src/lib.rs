//! # rendezvous-relay
//!
//! Mutual-TLS rendezvous relay.
//!
//! Two parties that cannot reach each other directly both connect to the
//! relay. The relay:
//! - Authenticates each party by its client certificate
//! - Parks the first arrival until the named peer shows up
//! - Tells each side its role for the end-to-end session, then drops TLS
//! - Forwards raw bytes between the two sockets until either side closes
//!
//! ## Architecture
//!
//! ```text
//! Party A ──┐                          ┌── Party B
//!           │  mTLS: AuthRequest       │
//!           ├─────────────────────────►│
//!       ┌───┴──────────────────────────┴───┐
//!       │         rendezvous-relay         │
//!       │  ┌────────────┐  ┌────────────┐  │
//!       │  │ transports │  │  sessions  │  │
//!       │  └────────────┘  └────────────┘  │
//!       └──────────────────────────────────┘
//!           ◄───── plain TCP, forwarded ─────►
//! ```
//!
//! ## Protocol
//!
//! - `{"DestParty": .., "Tag": ..}` from each party after the handshake
//! - `{"Mode": 1}` (server) to the party that waited, `{"Mode": 2}`
//!   (client) to the party that completed the pair
//! - `close_notify` both ways, then opaque bytes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authorizer;
pub mod config;
pub mod error;
pub mod eviction;
pub mod forwarder;
pub mod http;
pub mod identity;
pub mod listener;
pub mod logging;
pub mod server;
pub mod status;
pub mod store;
pub mod tls;

pub use authorizer::{Authorization, Authorizer};
pub use config::Config;
pub use error::{ProtocolError, RelayError, StoreError, TlsError};
pub use server::{Relay, RelayMetrics};
