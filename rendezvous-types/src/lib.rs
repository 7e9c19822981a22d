//! # rendezvous-types
//!
//! Wire format types for the rendezvous relay protocol.
//!
//! This crate provides the types shared by the relay and the parties that
//! connect to it:
//! - [`PartyId`], [`ConnectionKey`] - Identity and pairing keys
//! - [`AuthRequest`] - Sent by a party right after its TLS handshake
//! - [`Ready`], [`TlsMode`] - Sent by the relay once both parties arrived
//! - [`WireError`] - Error types
//!
//! With the `pem` feature, [`pem`] loads the certificates and keys both
//! sides configure their TLS from.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
#[cfg(feature = "pem")]
pub mod pem;

pub use error::WireError;
pub use ids::{ConnectionKey, PartyId};
pub use messages::{AuthRequest, Ready, TlsMode, MAX_AUTH_REQUEST_SIZE};
