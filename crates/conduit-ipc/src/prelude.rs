//! Prelude module - commonly used types for convenient import.
//!
//! Use `use conduit_ipc::prelude::*;` to import all essential types.

pub use crate::{
    CallError, Correlator, EnvelopeCodec, Transport, TransportConfig, TransportError,
    TransportHandle, TransportReader, TransportResult,
};
