use std::io::{ErrorKind, Write};
use std::thread;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{LinkWriter, Transport};

/// A [`LinkWriter`] over any blocking `Write` stream (serial device, pipe, file).
pub struct StreamLink<W> {
    inner: W,
}

impl<W: Write + Send> StreamLink<W> {
    /// Wrap a stream.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the link and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::yield_now(),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<W: Write + Send> LinkWriter for StreamLink<W> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < frame.len() {
            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::yield_now(),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        self.flush()
    }
}

/// In-memory link that records every written frame.
///
/// Clones share the same capture buffer, so one clone can be attached to a
/// [`TransportSet`] while another inspects what was written.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return all captured frames, oldest first.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *frames)
    }

    /// Number of frames captured and not yet taken.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// All captured bytes concatenated, without draining.
    pub fn bytes(&self) -> Vec<u8> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .concat()
    }
}

impl LinkWriter for MemoryLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame.to_vec());
        Ok(())
    }
}

/// The write sides of every transport, indexed by [`Transport`].
#[derive(Default)]
pub struct TransportSet {
    links: [Option<Box<dyn LinkWriter>>; 2],
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the writer for a transport.
    pub fn attach(&mut self, transport: Transport, link: impl LinkWriter + 'static) {
        self.links[transport.index()] = Some(Box::new(link));
    }

    /// Builder form of [`TransportSet::attach`].
    pub fn with(mut self, transport: Transport, link: impl LinkWriter + 'static) -> Self {
        self.attach(transport, link);
        self
    }

    /// Detach the writer for a transport, returning it.
    pub fn detach(&mut self, transport: Transport) -> Option<Box<dyn LinkWriter>> {
        self.links[transport.index()].take()
    }

    pub fn is_attached(&self, transport: Transport) -> bool {
        self.links[transport.index()].is_some()
    }

    /// Write one framed reply on `transport`.
    pub fn write(&mut self, transport: Transport, frame: &[u8]) -> Result<()> {
        let link = self.links[transport.index()]
            .as_mut()
            .ok_or(TransportError::NotAttached(transport))?;
        trace!(%transport, len = frame.len(), "writing frame");
        link.write_frame(frame)
    }
}

impl std::fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSet")
            .field("uart", &self.is_attached(Transport::Uart))
            .field("usb", &self.is_attached(Transport::Usb))
            .finish()
    }
}
