use std::sync::atomic::{AtomicU8, Ordering};

use hostlink_transport::Transport;

/// Remembers which transport delivered the request being answered so the
/// reply goes back the same way.
///
/// The dispatcher records the transport of each delivery as it takes it from
/// the mailbox, before the payload is validated, so a NAK for a corrupted
/// frame still finds its way. Frames completing while a request is in flight
/// leave its route untouched.
#[derive(Debug)]
pub struct TransportRouter {
    last_source: AtomicU8,
}

impl TransportRouter {
    pub fn new() -> Self {
        Self {
            last_source: AtomicU8::new(Transport::Uart.index() as u8),
        }
    }

    /// Record `transport` as the source of the request being answered.
    pub fn record(&self, transport: Transport) {
        self.last_source
            .store(transport.index() as u8, Ordering::Release);
    }

    /// Transport the next reply should be written to.
    pub fn route_reply(&self) -> Transport {
        Transport::from_u8(self.last_source.load(Ordering::Acquire)).unwrap_or(Transport::Uart)
    }
}

impl Default for TransportRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_uart() {
        assert_eq!(TransportRouter::new().route_reply(), Transport::Uart);
    }

    #[test]
    fn follows_latest_record() {
        let router = TransportRouter::new();
        router.record(Transport::Usb);
        assert_eq!(router.route_reply(), Transport::Usb);
        router.record(Transport::Uart);
        assert_eq!(router.route_reply(), Transport::Uart);
    }
}
