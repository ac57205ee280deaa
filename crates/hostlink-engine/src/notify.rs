use std::sync::{Condvar, Mutex};
use std::time::Duration;

use hostlink_transport::Transport;

/// A frame (or framing error) from the UART is waiting in the mailbox.
pub const UART_FRAME_READY: u32 = 1 << 0;

/// A frame (or framing error) from USB is waiting in the mailbox.
pub const USB_FRAME_READY: u32 = 1 << 1;

/// Periodic wake-up for work outside the protocol engine.
pub const PERIODIC: u32 = 1 << 2;

/// Any frame-ready bit.
pub const FRAME_READY_MASK: u32 = UART_FRAME_READY | USB_FRAME_READY;

/// Notification bit a transport raises when it publishes.
pub const fn frame_ready_bit(transport: Transport) -> u32 {
    match transport {
        Transport::Uart => UART_FRAME_READY,
        Transport::Usb => USB_FRAME_READY,
    }
}

/// Notification word the worker task blocks on.
///
/// Producers OR bits in and never block beyond the internal lock; the worker
/// waits with a timeout and clears every bit it observed.
#[derive(Debug, Default)]
pub struct Notifier {
    bits: Mutex<u32>,
    cond: Condvar,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `bits` and wake the worker.
    pub fn notify(&self, bits: u32) {
        let mut word = self.bits.lock().unwrap_or_else(|e| e.into_inner());
        *word |= bits;
        self.cond.notify_one();
    }

    /// Wait until any bit is set or `timeout` elapses. Returns and clears the
    /// observed bits; zero means the wait timed out.
    pub fn wait(&self, timeout: Duration) -> u32 {
        let word = self.bits.lock().unwrap_or_else(|e| e.into_inner());
        let (mut word, _) = self
            .cond
            .wait_timeout_while(word, timeout, |bits| *bits == 0)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *word)
    }

    /// Bits currently set, without clearing them.
    pub fn pending(&self) -> u32 {
        *self.bits.lock().unwrap_or_else(|e| e.into_inner())
    }
}
