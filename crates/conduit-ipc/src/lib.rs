//! Conduit IPC - framed transport and request correlation.
//!
//! This crate provides:
//! - [`EnvelopeCodec`]: 4-byte big-endian length prefix + JSON envelope
//! - [`Transport`]: splits one duplex stream into a cloneable send handle,
//!   backed by a writer task, and a single receive half
//! - [`Correlator`]: turns the async duplex stream into awaited calls with
//!   per-call timeouts
//!
//! Both the host and the plugin SDK build on these pieces.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use conduit_core::Message;
//! use conduit_ipc::{Correlator, Transport, TransportConfig};
//!
//! # async fn example(stream: tokio::net::UnixStream) {
//! let (handle, mut reader) = Transport::split(stream, &TransportConfig::default());
//! let correlator = std::sync::Arc::new(Correlator::new(handle));
//!
//! let rx = std::sync::Arc::clone(&correlator);
//! tokio::spawn(async move {
//!     while let Some(Ok(envelope)) = reader.next().await {
//!         if let Some(id) = envelope.id {
//!             rx.resolve(id, envelope.message);
//!         }
//!     }
//!     rx.close();
//! });
//!
//! let reply = correlator.call(Message::ConfigGet, Duration::from_secs(5)).await;
//! # let _ = reply;
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod codec;
mod correlator;
mod error;
mod transport;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, EnvelopeCodec};
pub use correlator::Correlator;
pub use error::{CallError, TransportError, TransportResult};
pub use transport::{
    DEFAULT_OUTBOUND_QUEUE, Transport, TransportConfig, TransportHandle, TransportReader,
};
