use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::link::StreamLink;

/// Default baud rate of the host UART.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read timeout used so receive threads can observe shutdown.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A serial device (UART adapter or USB CDC port) opened for the host link.
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialDevice {
    /// Open `path` at `baud_rate` with the default read timeout.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_timeout(path, baud_rate, DEFAULT_READ_TIMEOUT)
    }

    /// Open `path` with an explicit read timeout.
    pub fn open_with_timeout(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|err| TransportError::Open {
                path: path.to_string(),
                source: err.into(),
            })?;
        info!(path, baud_rate, "opened serial device");
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    /// Device path this port was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Split into an independent read handle and a write link.
    pub fn split(self) -> Result<(Box<dyn SerialPort>, StreamLink<Box<dyn SerialPort>>)> {
        let reader = self.port.try_clone().map_err(|err| TransportError::Open {
            path: self.path.clone(),
            source: err.into(),
        })?;
        debug!(path = %self.path, "cloned serial handle for reader");
        Ok((reader, StreamLink::new(self.port)))
    }
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.path)
            .finish()
    }
}
