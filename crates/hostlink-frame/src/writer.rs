use std::io::{ErrorKind, Write};
use std::thread;

use bytes::BytesMut;

use crate::codec::{encode_frame, FrameConfig};
use crate::crc::{append_crc, CRC_LEN};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(2 * config.max_packet_size + 2),
            config,
        }
    }

    /// Append the link CRC to `body`, frame it, and send it (blocking).
    pub fn send(&mut self, body: &[u8]) -> Result<()> {
        let mut packet = Vec::with_capacity(body.len() + CRC_LEN);
        packet.extend_from_slice(body);
        append_crc(&mut packet);
        self.send_packet(&packet)
    }

    /// Frame and send a packet that already carries its CRC.
    pub fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() > self.config.max_packet_size {
            return Err(FrameError::PayloadTooLarge {
                size: packet.len(),
                max: self.config.max_packet_size,
            });
        }

        self.buf.clear();
        encode_frame(packet, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::yield_now(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::yield_now(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
