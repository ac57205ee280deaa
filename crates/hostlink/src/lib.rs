//! Host command link for the cleaning-robot controller.
//!
//! The controller accepts commands from a host over a UART and a USB bulk
//! endpoint, both carrying the same byte-stuffed, CRC-16 protected frames.
//!
//! # Crate Structure
//!
//! - [`transport`] — Transport identities and blocking reply links
//! - [`frame`] — Frame codec and CRC-16
//! - [`engine`] — Mailbox, dispatcher, handlers and reply emitter

/// Re-export transport types.
pub mod transport {
    pub use hostlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hostlink_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use hostlink_engine::*;
}
