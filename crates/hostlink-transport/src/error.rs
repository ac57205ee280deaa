use crate::traits::Transport;

/// Errors that can occur on a host link transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device backing a transport.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    /// An I/O error occurred while writing to the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No writer is attached for the transport a reply was routed to.
    #[error("no link attached for {0}")]
    NotAttached(Transport),

    /// The link accepted zero bytes; the peer side is gone.
    #[error("link closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
