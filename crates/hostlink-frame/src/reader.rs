use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Instant;

use bytes::Bytes;

use crate::codec::{FrameConfig, FrameDecoder};
use crate::crc::{compute, split_crc, LINK_SEED};
use crate::error::{FrameError, ReceiveError, Result};

const READ_CHUNK_SIZE: usize = 512;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. Frames the decoder had to drop surface
/// as [`FrameError::Receive`]; the reader stays usable afterwards.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    ready: VecDeque<std::result::Result<Bytes, ReceiveError>>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::with_capacity(config.max_packet_size),
            ready: VecDeque::new(),
            config,
        }
    }

    /// Read the next raw packet (payload and CRC, unescaped).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached and
    /// `Err(FrameError::Timeout)` when `read_timeout` elapses first. Stream
    /// timeouts before that deadline are retried.
    pub fn read_packet(&mut self) -> Result<Bytes> {
        let deadline = self
            .config
            .read_timeout
            .map(|timeout| (timeout, Instant::now() + timeout));
        loop {
            if let Some(outcome) = self.ready.pop_front() {
                return outcome.map_err(FrameError::Receive);
            }
            if let Some((timeout, at)) = deadline {
                if Instant::now() >= at {
                    return Err(FrameError::Timeout(timeout));
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if deadline.is_some()
                        && matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
                {
                    thread::yield_now();
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.ready.extend(self.decoder.push_slice(&chunk[..read]));
        }
    }

    /// Read the next packet, check its CRC, and return the body without it.
    pub fn read_checked(&mut self) -> Result<Bytes> {
        let packet = self.read_packet()?;
        let (body, received) = split_crc(&packet).ok_or(ReceiveError::TooShort {
            len: packet.len(),
        })?;
        let computed = compute(LINK_SEED, body);
        if computed != received {
            return Err(ReceiveError::CrcMismatch { computed, received }.into());
        }
        Ok(packet.slice(..body.len()))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
