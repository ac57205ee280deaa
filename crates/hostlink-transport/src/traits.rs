use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// A physical channel that can deliver a request and carry its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Transport {
    /// The board's host UART (byte-at-a-time receive interrupt).
    Uart = 0,
    /// The USB CDC bulk endpoint (chunked receive callback).
    Usb = 1,
}

impl Transport {
    /// Every transport, in index order.
    pub const ALL: [Transport; 2] = [Transport::Uart, Transport::Usb];

    /// Stable index used for atomic storage and lookup tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Transport::index`] for values stored as `u8`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Transport::Uart),
            1 => Some(Transport::Usb),
            _ => None,
        }
    }

    /// Lowercase name for logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            Transport::Uart => "uart",
            Transport::Usb => "usb",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uart" | "serial" => Ok(Transport::Uart),
            "usb" | "cdc" => Ok(Transport::Usb),
            other => Err(format!("unknown transport '{other}' (expected uart or usb)")),
        }
    }
}

/// Blocking write side of a transport.
///
/// The engine hands over one fully framed reply per call. Implementations
/// must write all of it before returning.
pub trait LinkWriter: Send {
    /// Write one framed reply.
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

impl<L: LinkWriter + ?Sized> LinkWriter for Box<L> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).write_frame(frame)
    }
}
