//! # rendezvous-client
//!
//! Party side of the rendezvous relay.
//!
//! A party connects to the relay with its client certificate, names the
//! party it wants to reach, and waits. Once the peer shows up the relay
//! assigns a role, closes TLS, and the party is left holding a plain TCP
//! stream that now leads straight to its peer.
//!
//! ## Example
//!
//! ```ignore
//! use rendezvous_client::{ClientConfig, RelayClient};
//! use rendezvous_types::TlsMode;
//!
//! let client = RelayClient::new(config)?;
//! let session = client.connect("bob", "backup").await?;
//! match session.mode {
//!     TlsMode::Server => { /* accept the end-to-end handshake */ }
//!     TlsMode::Client => { /* initiate it */ }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;

pub use client::{connector, rendezvous, ClientConfig, ClientError, Rendezvous, RelayClient};
