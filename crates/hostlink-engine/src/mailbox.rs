use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use hostlink_frame::ReceiveError;
use hostlink_transport::Transport;
use tracing::debug;

/// One inbound frame outcome and the transport it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub transport: Transport,
    /// Unescaped payload including its CRC, or the reason the frame was dropped.
    pub packet: Result<Bytes, ReceiveError>,
}

impl Delivery {
    pub fn packet(transport: Transport, payload: Bytes) -> Self {
        Self {
            transport,
            packet: Ok(payload),
        }
    }

    pub fn error(transport: Transport, error: ReceiveError) -> Self {
        Self {
            transport,
            packet: Err(error),
        }
    }
}

/// Single-slot hand-off between the receive contexts and the dispatcher.
///
/// At most one delivery is pending. A delivery published before the previous
/// one was taken replaces it; there is no queue and no backpressure.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Delivery>>,
    overwritten: AtomicU64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a delivery. Returns true if an unconsumed one was replaced.
    pub fn publish(&self, delivery: Delivery) -> bool {
        let transport = delivery.transport;
        let replaced = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.replace(delivery)
        };
        match replaced {
            Some(previous) => {
                self.overwritten.fetch_add(1, Ordering::Relaxed);
                debug!(
                    %transport,
                    replaced_from = %previous.transport,
                    "unconsumed delivery overwritten"
                );
                true
            }
            None => false,
        }
    }

    /// Replace a delivery from `transport` still waiting in the slot with
    /// `error`. Returns false, leaving the slot alone, when the slot is empty
    /// or holds another transport's delivery.
    pub fn supersede(&self, transport: Transport, error: ReceiveError) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(pending) if pending.transport == transport => {
                *slot = Some(Delivery::error(transport, error));
                drop(slot);
                self.overwritten.fetch_add(1, Ordering::Relaxed);
                debug!(%transport, %error, "pending delivery superseded");
                true
            }
            _ => false,
        }
    }

    /// Read and clear the slot.
    pub fn take(&self) -> Option<Delivery> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn is_full(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Deliveries lost to overwrites since creation.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
