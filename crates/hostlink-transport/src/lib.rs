//! Transport identities and blocking byte sinks for the host command link.
//!
//! The controller answers the host on two physical channels, a UART and a
//! USB bulk endpoint. This crate names those channels ([`Transport`]) and
//! provides the blocking write side the protocol engine replies through
//! ([`LinkWriter`], [`TransportSet`]). The receive side belongs to the
//! protocol engine, which is fed byte by byte from interrupt-like contexts.

pub mod error;
pub mod link;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use link::{MemoryLink, StreamLink, TransportSet};
pub use traits::{LinkWriter, Transport};

#[cfg(feature = "serial")]
pub use serial::SerialDevice;
