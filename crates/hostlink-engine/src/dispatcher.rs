use std::sync::Arc;

use hostlink_frame::{compute, split_crc, ReceiveError, LINK_SEED};
use hostlink_transport::Transport;
use tracing::{debug, info, trace, warn};

use crate::config::RetryPolicy;
use crate::emitter::ResponseEmitter;
use crate::envelope::{
    CommandId, RequestEnvelope, BROADCAST, NO_COMMAND, NO_SUBCOMMAND,
};
use crate::error::{DispatchError, HandlerError, Result};
use crate::mailbox::Mailbox;

/// Smallest packet that can hold a CRC and at least one byte.
const MIN_PACKET_LEN: usize = 3;

/// A validated request handed to a domain handler.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub transport: Transport,
    pub envelope: RequestEnvelope,
    /// Argument bytes after the header, CRC removed.
    pub args: &'a [u8],
    /// Invocation number for this request, starting at 1 and growing with
    /// each busy retry.
    pub attempt: u32,
}

impl Request<'_> {
    pub fn command_id(&self) -> u8 {
        self.envelope.command_id
    }

    pub fn subcommand(&self) -> u8 {
        self.envelope.subcommand_id
    }

    pub fn flags(&self) -> u8 {
        self.envelope.flags
    }
}

/// Interprets the subcommands of one command family.
///
/// On success the handler has already sent its ACK or data reply through the
/// emitter. On failure it must not send anything; the dispatcher NAKs.
pub trait DomainHandler: Send {
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> std::result::Result<(), HandlerError>;
}

impl<F> DomainHandler for F
where
    F: FnMut(&Request<'_>, &mut ResponseEmitter) -> std::result::Result<(), HandlerError> + Send,
{
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> std::result::Result<(), HandlerError> {
        self(request, emitter)
    }
}

/// Pin a closure to the handler signature so its argument lifetimes are
/// inferred as higher-ranked.
pub fn handler_fn<F>(f: F) -> F
where
    F: FnMut(&Request<'_>, &mut ResponseEmitter) -> std::result::Result<(), HandlerError> + Send,
{
    f
}

/// One optional handler per command family.
#[derive(Default)]
pub struct HandlerTable {
    handlers: [Option<Box<dyn DomainHandler>>; 4],
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the handler for `command`.
    pub fn register(&mut self, command: CommandId, handler: impl DomainHandler + 'static) {
        self.handlers[command.index()] = Some(Box::new(handler));
    }

    /// Builder form of [`HandlerTable::register`].
    pub fn with(mut self, command: CommandId, handler: impl DomainHandler + 'static) -> Self {
        self.register(command, handler);
        self
    }

    pub fn remove(&mut self, command: CommandId) -> Option<Box<dyn DomainHandler>> {
        self.handlers[command.index()].take()
    }

    pub fn is_registered(&self, command: CommandId) -> bool {
        self.handlers[command.index()].is_some()
    }

    fn get_mut(&mut self, command: CommandId) -> Option<&mut Box<dyn DomainHandler>> {
        self.handlers[command.index()].as_mut()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<&str> = CommandId::ALL
            .iter()
            .filter(|command| self.is_registered(**command))
            .map(|command| command.name())
            .collect();
        f.debug_struct("HandlerTable")
            .field("registered", &registered)
            .finish()
    }
}

/// Successful outcome of one [`CommandDispatcher::handle`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The mailbox was empty.
    Idle,
    /// The request was addressed to another device and dropped silently.
    Ignored { target: u16 },
    /// A handler accepted the request and replied.
    Handled {
        command: CommandId,
        subcommand: u8,
        attempts: u32,
    },
}

/// Validates the pending packet, routes it to its family handler and NAKs
/// anything that fails.
pub struct CommandDispatcher {
    mailbox: Arc<Mailbox>,
    handlers: HandlerTable,
    address: u16,
    retry: RetryPolicy,
}

impl CommandDispatcher {
    pub fn new(
        mailbox: Arc<Mailbox>,
        handlers: HandlerTable,
        address: u16,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            mailbox,
            handlers,
            address,
            retry,
        }
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        &mut self.handlers
    }

    /// Take the pending delivery, if any, and process it to completion.
    ///
    /// Every `Err` has already been NAK'd on the delivery's transport.
    pub fn handle(&mut self, emitter: &mut ResponseEmitter) -> Result<Dispatch> {
        let Some(delivery) = self.mailbox.take() else {
            return Ok(Dispatch::Idle);
        };
        let transport = delivery.transport;
        emitter.route_to(transport);

        let packet = match delivery.packet {
            Ok(packet) if packet.len() >= MIN_PACKET_LEN => packet,
            Ok(packet) => {
                return Err(reject(
                    emitter,
                    ReceiveError::TooShort { len: packet.len() }.into(),
                ))
            }
            Err(err) => return Err(reject(emitter, err.into())),
        };

        let Some((body, received)) = split_crc(&packet) else {
            return Err(reject(
                emitter,
                ReceiveError::TooShort { len: packet.len() }.into(),
            ));
        };
        let computed = compute(LINK_SEED, body);
        if computed != received {
            return Err(reject(
                emitter,
                ReceiveError::CrcMismatch { computed, received }.into(),
            ));
        }

        let Some((target, command_raw)) = RequestEnvelope::routing(body) else {
            return Err(reject(
                emitter,
                DispatchError::InvalidLength { len: body.len() },
            ));
        };

        if target != BROADCAST && target != self.address {
            trace!(%transport, address = target, own = self.address, "request for another device");
            return Ok(Dispatch::Ignored { target });
        }

        let subcommand_raw = body.get(5).copied().unwrap_or(NO_SUBCOMMAND);
        let Some(command) = CommandId::from_u8(command_raw) else {
            let err = DispatchError::UnknownCommand(command_raw);
            warn!(%transport, error = %err, "rejecting request");
            emitter.send_nak(command_raw, subcommand_raw, err.code());
            return Err(err);
        };

        let Some((envelope, args)) = RequestEnvelope::parse(body) else {
            let err = DispatchError::InvalidLength { len: body.len() };
            warn!(%transport, error = %err, "rejecting request");
            emitter.send_nak(command_raw, subcommand_raw, err.code());
            return Err(err);
        };

        let mut request = Request {
            transport,
            envelope,
            args,
            attempt: 0,
        };
        let subcommand = envelope.subcommand_id;
        debug!(
            %transport,
            %command,
            subcommand,
            flags = envelope.flags,
            args = args.len(),
            "dispatching request"
        );

        let retry = self.retry;
        let Some(handler) = self.handlers.get_mut(command) else {
            let err = DispatchError::NoHandler(command);
            warn!(%transport, error = %err, "rejecting request");
            emitter.send_nak(command_raw, subcommand, err.code());
            return Err(err);
        };

        let max_attempts = retry.max_attempts.max(1);
        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            request.attempt = attempts;
            match handler.handle(&request, emitter) {
                Err(HandlerError::Busy) if attempts < max_attempts => {
                    debug!(%command, subcommand, attempts, "handler busy; retrying");
                    if !retry.delay.is_zero() {
                        std::thread::sleep(retry.delay);
                    }
                }
                other => break other,
            }
        };

        match outcome {
            Ok(()) => Ok(Dispatch::Handled {
                command,
                subcommand,
                attempts,
            }),
            Err(error) => {
                let err = match error {
                    HandlerError::Busy => DispatchError::Busy {
                        command,
                        subcommand,
                        attempts,
                    },
                    HandlerError::UnknownSubcommand(subcommand) => {
                        DispatchError::UnknownSubcommand {
                            command,
                            subcommand,
                        }
                    }
                    error => DispatchError::Handler {
                        command,
                        subcommand,
                        error,
                    },
                };
                info!(%transport, error = %err, code = err.code(), "request failed");
                emitter.send_nak(command_raw, subcommand, err.code());
                Err(err)
            }
        }
    }
}

/// NAK a packet whose command context is unknown.
fn reject(emitter: &mut ResponseEmitter, err: DispatchError) -> DispatchError {
    warn!(error = %err, code = err.code(), "dropping inbound frame");
    emitter.send_nak(NO_COMMAND, NO_SUBCOMMAND, err.code());
    err
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("address", &self.address)
            .field("retry", &self.retry)
            .field("handlers", &self.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use hostlink_frame::{append_crc, FrameDecoder, CRC_LEN};
    use hostlink_transport::{MemoryLink, TransportSet};

    use super::*;
    use crate::envelope::{AckKind, Direction, ResponseEnvelope};
    use crate::error::codes;
    use crate::mailbox::Delivery;
    use crate::router::TransportRouter;

    const OWN_ADDRESS: u16 = 0x0042;

    struct Harness {
        mailbox: Arc<Mailbox>,
        router: Arc<TransportRouter>,
        uart: MemoryLink,
        usb: MemoryLink,
        emitter: ResponseEmitter,
        dispatcher: CommandDispatcher,
    }

    impl Harness {
        fn new(handlers: HandlerTable) -> Self {
            Self::with_retry(
                handlers,
                RetryPolicy {
                    max_attempts: 10,
                    delay: Duration::ZERO,
                },
            )
        }

        fn with_retry(handlers: HandlerTable, retry: RetryPolicy) -> Self {
            let mailbox = Arc::new(Mailbox::new());
            let router = Arc::new(TransportRouter::new());
            let uart = MemoryLink::new();
            let usb = MemoryLink::new();
            let links = TransportSet::new()
                .with(Transport::Uart, uart.clone())
                .with(Transport::Usb, usb.clone());
            let emitter = ResponseEmitter::new(OWN_ADDRESS, 256, links, Arc::clone(&router));
            let dispatcher =
                CommandDispatcher::new(Arc::clone(&mailbox), handlers, OWN_ADDRESS, retry);
            Self {
                mailbox,
                router,
                uart,
                usb,
                emitter,
                dispatcher,
            }
        }

        fn deliver(&mut self, transport: Transport, packet: Vec<u8>) -> Result<Dispatch> {
            self.mailbox
                .publish(Delivery::packet(transport, Bytes::from(packet)));
            self.dispatcher.handle(&mut self.emitter)
        }

        fn replies(&self, link: &MemoryLink) -> Vec<(ResponseEnvelope, Vec<u8>)> {
            let mut decoder = FrameDecoder::new();
            decoder
                .push_slice(&link.bytes())
                .into_iter()
                .map(|outcome| {
                    let packet = outcome.unwrap();
                    let body = &packet[..packet.len() - CRC_LEN];
                    let (envelope, data) = ResponseEnvelope::parse(body).unwrap();
                    (envelope, data.to_vec())
                })
                .collect()
        }
    }

    fn request(target: u16, command: u8, subcommand: u8, args: &[u8]) -> Vec<u8> {
        let mut packet = Vec::new();
        RequestEnvelope {
            target_address: target,
            device_class: 0x0007,
            command_id: command,
            subcommand_id: subcommand,
            flags: 0,
        }
        .encode(args, &mut packet);
        append_crc(&mut packet);
        packet
    }

    fn acking_handler(calls: Arc<AtomicU32>) -> impl DomainHandler {
        handler_fn(move |request, emitter| {
            calls.fetch_add(1, Ordering::SeqCst);
            match request.subcommand() {
                0x01 => {
                    emitter.send_ack(
                        request.command_id(),
                        request.subcommand(),
                        AckKind::Ack,
                        Direction::FireAndForget,
                    );
                    Ok(())
                }
                0x02 => {
                    emitter.send_reply(
                        request.command_id(),
                        request.subcommand(),
                        Direction::DataReply,
                        request.args,
                    );
                    Ok(())
                }
                other => Err(HandlerError::UnknownSubcommand(other)),
            }
        })
    }

    #[test]
    fn empty_mailbox_is_idle() {
        let mut h = Harness::new(HandlerTable::new());
        assert_eq!(h.dispatcher.handle(&mut h.emitter), Ok(Dispatch::Idle));
        assert_eq!(h.uart.frame_count(), 0);
    }

    #[test]
    fn addressed_request_reaches_handler() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::Device, acking_handler(calls.clone()));
        let mut h = Harness::new(handlers);

        let result = h.deliver(Transport::Uart, request(OWN_ADDRESS, 0x01, 0x01, &[]));
        assert_eq!(
            result,
            Ok(Dispatch::Handled {
                command: CommandId::Device,
                subcommand: 0x01,
                attempts: 1
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let replies = h.replies(&h.uart);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0.source_address, OWN_ADDRESS);
        assert_eq!(replies[0].0.ack, AckKind::Ack);
    }

    #[test]
    fn broadcast_is_accepted() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::Info, acking_handler(calls.clone()));
        let mut h = Harness::new(handlers);

        let result = h.deliver(Transport::Usb, request(BROADCAST, 0x02, 0x02, &[9, 8]));
        assert!(matches!(result, Ok(Dispatch::Handled { .. })));

        let replies = h.replies(&h.usb);
        assert_eq!(replies[0].0.direction, Direction::DataReply);
        assert_eq!(replies[0].1, vec![9, 8]);
        assert_eq!(h.uart.frame_count(), 0);
    }

    #[test]
    fn foreign_address_is_silently_ignored() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::Device, acking_handler(calls.clone()));
        let mut h = Harness::new(handlers);

        let result = h.deliver(Transport::Uart, request(0x0099, 0x01, 0x01, &[]));
        assert_eq!(result, Ok(Dispatch::Ignored { target: 0x0099 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.uart.frame_count() + h.usb.frame_count(), 0);
    }

    #[test]
    fn any_single_bit_flip_in_body_is_nakd_as_crc_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::Device, acking_handler(calls.clone()));
        let mut h = Harness::new(handlers);

        let good = request(OWN_ADDRESS, 0x01, 0x01, &[0x10, 0x20]);
        let body_len = good.len() - CRC_LEN;
        for bit in 0..body_len * 8 {
            let mut bad = good.clone();
            bad[bit / 8] ^= 1 << (bit % 8);
            let err = h.deliver(Transport::Uart, bad).unwrap_err();
            assert!(matches!(
                err,
                DispatchError::Receive(ReceiveError::CrcMismatch { .. })
            ));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let replies = h.replies(&h.uart);
        assert_eq!(replies.len(), body_len * 8);
        for (envelope, data) in replies {
            assert_eq!(envelope.ack, AckKind::Nak);
            assert_eq!(envelope.command_id, NO_COMMAND);
            assert_eq!(envelope.nak_code(&data), Some(codes::CRC_MISMATCH));
        }
    }

    #[test]
    fn framing_error_is_nakd_on_its_transport() {
        let mut h = Harness::new(HandlerTable::new());
        h.mailbox.publish(Delivery::error(
            Transport::Usb,
            ReceiveError::BadEscape { code: 0x33 },
        ));

        let err = h.dispatcher.handle(&mut h.emitter).unwrap_err();
        assert_eq!(err.code(), codes::BAD_ESCAPE);
        let replies = h.replies(&h.usb);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0.subcommand_id, NO_SUBCOMMAND);
        assert_eq!(replies[0].0.nak_code(&replies[0].1), Some(codes::BAD_ESCAPE));
    }

    #[test]
    fn reply_follows_the_delivery_taken() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::Device, acking_handler(calls));
        let mut h = Harness::new(handlers);

        h.mailbox.publish(Delivery::packet(
            Transport::Uart,
            Bytes::from(request(OWN_ADDRESS, 0x01, 0x01, &[])),
        ));
        h.router.record(Transport::Usb);

        assert!(matches!(
            h.dispatcher.handle(&mut h.emitter),
            Ok(Dispatch::Handled { .. })
        ));
        assert_eq!(h.uart.frame_count(), 1);
        assert_eq!(h.usb.frame_count(), 0);
        assert_eq!(h.router.route_reply(), Transport::Uart);
    }

    #[test]
    fn short_packets_are_rejected() {
        let mut h = Harness::new(HandlerTable::new());

        let err = h.deliver(Transport::Uart, vec![0x01, 0x02]).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Receive(ReceiveError::TooShort { len: 2 })
        );

        let mut four = vec![0x00, 0x00, 0x00, 0x00];
        append_crc(&mut four);
        let err = h.deliver(Transport::Uart, four).unwrap_err();
        assert_eq!(err, DispatchError::InvalidLength { len: 4 });

        let codes_seen: Vec<u16> = h
            .replies(&h.uart)
            .iter()
            .map(|(envelope, data)| envelope.nak_code(data).unwrap())
            .collect();
        assert_eq!(codes_seen, vec![codes::TOO_SHORT, codes::INVALID_LENGTH]);
    }

    #[test]
    fn routable_but_truncated_header_is_invalid_length() {
        let mut h = Harness::new(HandlerTable::new());
        let mut packet = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0x01];
        append_crc(&mut packet);

        let err = h.deliver(Transport::Uart, packet).unwrap_err();
        assert_eq!(err, DispatchError::InvalidLength { len: 6 });
        let replies = h.replies(&h.uart);
        assert_eq!(replies[0].0.command_id, 0x01);
        assert_eq!(replies[0].0.subcommand_id, 0x01);
    }

    #[test]
    fn unknown_command_is_nakd_with_its_id() {
        let mut h = Harness::new(HandlerTable::new());
        let err = h
            .deliver(Transport::Uart, request(OWN_ADDRESS, 0x7E, 0x03, &[]))
            .unwrap_err();
        assert_eq!(err, DispatchError::UnknownCommand(0x7E));

        let replies = h.replies(&h.uart);
        assert_eq!(replies[0].0.command_id, 0x7E);
        assert_eq!(replies[0].0.subcommand_id, 0x03);
        assert_eq!(
            replies[0].0.nak_code(&replies[0].1),
            Some(codes::UNKNOWN_COMMAND)
        );
    }

    #[test]
    fn unregistered_family_is_unknown_command() {
        let mut h = Harness::new(HandlerTable::new());
        let err = h
            .deliver(Transport::Uart, request(OWN_ADDRESS, 0x04, 0x01, &[]))
            .unwrap_err();
        assert_eq!(err, DispatchError::NoHandler(CommandId::Measurement));
        assert_eq!(err.code(), codes::UNKNOWN_COMMAND);
    }

    #[test]
    fn unknown_subcommand_is_nakd() {
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerTable::new().with(CommandId::System, acking_handler(calls.clone()));
        let mut h = Harness::new(handlers);

        let err = h
            .deliver(Transport::Uart, request(OWN_ADDRESS, 0x03, 0x55, &[]))
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnknownSubcommand {
                command: CommandId::System,
                subcommand: 0x55
            }
        );
        let replies = h.replies(&h.uart);
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].0.nak_code(&replies[0].1),
            Some(codes::UNKNOWN_SUBCOMMAND)
        );
    }

    #[test]
    fn always_busy_handler_is_called_exactly_retry_limit_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handlers = HandlerTable::new().with(
            CommandId::Measurement,
            handler_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Busy)
            }),
        );
        let mut h = Harness::new(handlers);

        let err = h
            .deliver(Transport::Uart, request(OWN_ADDRESS, 0x04, 0x01, &[]))
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Busy {
                command: CommandId::Measurement,
                subcommand: 0x01,
                attempts: 10
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 10);

        let replies = h.replies(&h.uart);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0.nak_code(&replies[0].1), Some(codes::BUSY));
    }

    #[test]
    fn busy_then_success_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handlers = HandlerTable::new().with(
            CommandId::Measurement,
            handler_fn(move |request, emitter| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(HandlerError::Busy);
                }
                emitter.send_reply(
                    request.command_id(),
                    request.subcommand(),
                    Direction::DataReply,
                    &[0x2A],
                );
                Ok(())
            }),
        );
        let mut h = Harness::with_retry(
            handlers,
            RetryPolicy {
                max_attempts: 5,
                delay: Duration::from_millis(1),
            },
        );

        let result = h.deliver(Transport::Usb, request(OWN_ADDRESS, 0x04, 0x07, &[]));
        assert_eq!(
            result,
            Ok(Dispatch::Handled {
                command: CommandId::Measurement,
                subcommand: 0x07,
                attempts: 3
            })
        );
        let replies = h.replies(&h.usb);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, vec![0x2A]);
    }

    #[test]
    fn other_handler_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handlers = HandlerTable::new().with(
            CommandId::System,
            handler_fn(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Failed(0x0123))
            }),
        );
        let mut h = Harness::new(handlers);

        let err = h
            .deliver(Transport::Uart, request(OWN_ADDRESS, 0x03, 0x01, &[]))
            .unwrap_err();
        assert_eq!(err.code(), 0x0123);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
