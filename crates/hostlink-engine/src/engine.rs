use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use hostlink_frame::{DecoderState, FrameDecoder, ReceiveError, START};
use hostlink_transport::{Transport, TransportSet};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::dispatcher::{CommandDispatcher, Dispatch, HandlerTable};
use crate::emitter::ResponseEmitter;
use crate::envelope::CommandId;
use crate::error::Result;
use crate::handlers::{DeviceHandler, FirmwareVersion, InfoHandler, SystemHandler};
use crate::mailbox::{Delivery, Mailbox};
use crate::notify::{frame_ready_bit, Notifier, FRAME_READY_MASK, PERIODIC};
use crate::router::TransportRouter;

/// Handlers for the device, info and system families, configured from `config`.
pub fn builtin_handlers(config: &EngineConfig) -> HandlerTable {
    HandlerTable::new()
        .with(
            CommandId::Device,
            DeviceHandler::new(config.device_address, config.device_class),
        )
        .with(
            CommandId::Info,
            InfoHandler::new(FirmwareVersion::current(), config.max_packet_size),
        )
        .with(CommandId::System, SystemHandler::new())
}

/// The protocol worker: owns the dispatcher and emitter and hands out
/// [`Receiver`]s to the transport contexts.
pub struct ProtocolEngine {
    config: EngineConfig,
    mailbox: Arc<Mailbox>,
    notifier: Arc<Notifier>,
    dispatcher: CommandDispatcher,
    emitter: ResponseEmitter,
}

impl ProtocolEngine {
    pub fn new(config: EngineConfig, links: TransportSet, handlers: HandlerTable) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&mailbox),
            handlers,
            config.device_address,
            config.retry_policy(),
        );
        let emitter = ResponseEmitter::new(
            config.device_address,
            config.max_packet_size,
            links,
            Arc::new(TransportRouter::new()),
        );
        debug!(
            address = config.device_address,
            max_packet = config.max_packet_size,
            retry_limit = config.busy_retry_limit,
            "protocol engine created"
        );
        Self {
            config,
            mailbox,
            notifier: Arc::new(Notifier::new()),
            dispatcher,
            emitter,
        }
    }

    /// Engine with the device, info and system handlers installed.
    pub fn with_builtin_handlers(config: EngineConfig, links: TransportSet) -> Self {
        let handlers = builtin_handlers(&config);
        Self::new(config, links, handlers)
    }

    /// Receive-side handle for `transport`. Each transport needs its own.
    pub fn receiver(&self, transport: Transport) -> Receiver {
        Receiver {
            transport,
            decoder: FrameDecoder::with_capacity(self.config.max_packet_size),
            mailbox: Arc::clone(&self.mailbox),
            notifier: Arc::clone(&self.notifier),
        }
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerTable {
        self.dispatcher.handlers_mut()
    }

    pub fn emitter_mut(&mut self) -> &mut ResponseEmitter {
        &mut self.emitter
    }

    /// Process the pending delivery, if any, without waiting.
    pub fn poll(&mut self) -> Result<Dispatch> {
        self.dispatcher.handle(&mut self.emitter)
    }

    /// Wait up to the configured timeout for a notification, then process
    /// until the mailbox is empty.
    pub fn run_once(&mut self) -> Cycle {
        let events = self.notifier.wait(self.config.wait_timeout);
        if events & PERIODIC != 0 {
            trace!("periodic wake-up");
        }

        let mut cycle = Cycle {
            events,
            ..Cycle::default()
        };
        if events & FRAME_READY_MASK == 0 && !self.mailbox.is_full() {
            return cycle;
        }

        loop {
            match self.poll() {
                Ok(Dispatch::Idle) => break,
                Ok(Dispatch::Ignored { .. }) => cycle.ignored += 1,
                Ok(Dispatch::Handled { .. }) => cycle.handled += 1,
                Err(_) => cycle.rejected += 1,
            }
        }
        cycle
    }

    /// Run cycles until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(address = self.config.device_address, "protocol engine running");
        while running.load(Ordering::SeqCst) {
            self.run_once();
        }
        info!(
            replies = self.emitter.frames_sent(),
            overwritten = self.mailbox.overwritten(),
            "protocol engine stopped"
        );
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("emitter", &self.emitter)
            .finish()
    }
}

/// What one [`ProtocolEngine::run_once`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cycle {
    /// Notification bits observed; zero on timeout.
    pub events: u32,
    pub handled: usize,
    pub ignored: usize,
    /// Deliveries answered with a NAK.
    pub rejected: usize,
}

/// Receive context for one transport.
///
/// Feeds bytes through its own decoder and publishes every completed frame
/// or framing error to the shared mailbox. Never blocks on the worker.
///
/// A frame that starts while this transport's previous delivery is still
/// waiting in the mailbox is dropped and the pending delivery is replaced by
/// a premature-start error. Deliveries from the other transport are simply
/// overwritten.
#[derive(Debug)]
pub struct Receiver {
    transport: Transport,
    decoder: FrameDecoder,
    mailbox: Arc<Mailbox>,
    notifier: Arc<Notifier>,
}

impl Receiver {
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Byte-received callback.
    pub fn on_byte(&mut self, byte: u8) {
        if byte == START
            && self.decoder.state() == DecoderState::Idle
            && self
                .mailbox
                .supersede(self.transport, ReceiveError::PrematureStart)
        {
            debug!(transport = %self.transport, "frame started before previous was consumed");
            self.notifier.notify(frame_ready_bit(self.transport));
            return;
        }
        if let Some(outcome) = self.decoder.push(byte) {
            self.deliver(outcome);
        }
    }

    /// Bulk-transfer callback.
    pub fn on_chunk(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            self.on_byte(byte);
        }
    }

    fn deliver(&self, outcome: std::result::Result<Bytes, ReceiveError>) {
        match &outcome {
            Ok(packet) => trace!(transport = %self.transport, len = packet.len(), "frame received"),
            Err(err) => debug!(transport = %self.transport, error = %err, "framing error"),
        }
        self.mailbox.publish(Delivery {
            transport: self.transport,
            packet: outcome,
        });
        self.notifier.notify(frame_ready_bit(self.transport));
    }
}

/// Pump `reader` into `receiver` on a background thread until EOF, a read
/// error, or `running` is cleared. Timeouts count as "no data yet".
pub fn spawn_stream_receiver<R>(
    mut reader: R,
    mut receiver: Receiver,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let transport = receiver.transport();
    thread::Builder::new()
        .name(format!("hostlink-rx-{transport}"))
        .spawn(move || {
            let mut buf = [0u8; 256];
            while running.load(Ordering::SeqCst) {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        info!(%transport, "link closed");
                        break;
                    }
                    Ok(n) => receiver.on_chunk(&buf[..n]),
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) => {}
                    Err(e) => {
                        warn!(%transport, error = %e, "link read failed");
                        break;
                    }
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use hostlink_frame::{CRC_LEN, END};
    use hostlink_transport::MemoryLink;

    use super::*;
    use crate::envelope::{AckKind, ResponseEnvelope};
    use crate::error::codes;

    const PING_FRAME: [u8; 11] = [
        0xA0, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x01, 0x04, 0x05,
    ];
    const PING_ACK: [u8; 10] = [0xA0, 0x00, 0x00, 0x01, 0x06, 0x01, 0x00, 0x25, 0xF7, 0x05];

    fn engine(config: EngineConfig) -> (ProtocolEngine, MemoryLink, MemoryLink) {
        let uart = MemoryLink::new();
        let usb = MemoryLink::new();
        let links = TransportSet::new()
            .with(Transport::Uart, uart.clone())
            .with(Transport::Usb, usb.clone());
        (
            ProtocolEngine::with_builtin_handlers(config, links),
            uart,
            usb,
        )
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            wait_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        }
    }

    fn nak_codes(link: &MemoryLink) -> Vec<u16> {
        let mut decoder = FrameDecoder::new();
        decoder
            .push_slice(&link.bytes())
            .into_iter()
            .filter_map(|outcome| {
                let packet = outcome.ok()?;
                let (envelope, data) = ResponseEnvelope::parse(&packet[..packet.len() - CRC_LEN])?;
                envelope.nak_code(data)
            })
            .collect()
    }

    #[test]
    fn ping_over_uart_end_to_end() {
        let (mut engine, uart, usb) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);
        rx.on_chunk(&PING_FRAME);

        let cycle = engine.run_once();
        assert_eq!(cycle.events, crate::notify::UART_FRAME_READY);
        assert_eq!(cycle.handled, 1);
        assert_eq!(uart.take_frames(), vec![PING_ACK.to_vec()]);
        assert_eq!(usb.frame_count(), 0);
    }

    #[test]
    fn reply_follows_the_request_transport() {
        let (mut engine, uart, usb) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Usb);
        rx.on_chunk(&PING_FRAME);

        engine.run_once();
        assert_eq!(uart.frame_count(), 0);
        assert_eq!(usb.take_frames(), vec![PING_ACK.to_vec()]);
    }

    #[test]
    fn foreign_address_produces_no_bytes() {
        let config = EngineConfig {
            device_address: 0x0042,
            ..fast_config()
        };
        let (mut engine, uart, usb) = engine(config);
        let mut rx = engine.receiver(Transport::Uart);

        let mut body = vec![0x43, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00];
        hostlink_frame::append_crc(&mut body);
        let mut wire = bytes::BytesMut::new();
        hostlink_frame::encode_frame(&body, &mut wire);
        rx.on_chunk(&wire);

        let cycle = engine.run_once();
        assert_eq!(cycle.ignored, 1);
        assert_eq!(uart.frame_count() + usb.frame_count(), 0);
    }

    #[test]
    fn premature_start_is_nakd_then_new_frame_handled() {
        let (mut engine, uart, _) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);

        rx.on_chunk(&[START, 0x11, 0x22]);
        rx.on_byte(START);
        assert!(matches!(
            engine.poll(),
            Err(crate::DispatchError::Receive(ReceiveError::PrematureStart))
        ));

        rx.on_chunk(&PING_FRAME[1..]);
        assert!(matches!(engine.poll(), Ok(Dispatch::Handled { .. })));

        assert_eq!(nak_codes(&uart), vec![codes::PREMATURE_START]);
        let frames = uart.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], PING_ACK.to_vec());
    }

    #[test]
    fn pending_framing_error_is_replaced_by_next_frame() {
        let (mut engine, uart, _) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);

        rx.on_chunk(&[START, 0x11, START]);
        rx.on_chunk(&PING_FRAME[1..]);
        assert_eq!(engine.mailbox().overwritten(), 1);

        let cycle = engine.run_once();
        assert_eq!(cycle.handled, 1);
        assert_eq!(cycle.rejected, 0);
        assert_eq!(uart.take_frames(), vec![PING_ACK.to_vec()]);
    }

    #[test]
    fn restart_before_consumption_is_premature_start() {
        let (mut engine, uart, usb) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);

        rx.on_chunk(&PING_FRAME);
        rx.on_chunk(&PING_FRAME);
        assert_eq!(engine.mailbox().overwritten(), 1);

        assert!(matches!(
            engine.poll(),
            Err(crate::DispatchError::Receive(ReceiveError::PrematureStart))
        ));
        assert_eq!(engine.poll(), Ok(Dispatch::Idle));
        assert_eq!(nak_codes(&uart), vec![codes::PREMATURE_START]);
        assert_eq!(usb.frame_count(), 0);

        rx.on_chunk(&PING_FRAME);
        assert!(matches!(engine.poll(), Ok(Dispatch::Handled { .. })));
        assert_eq!(uart.take_frames().last(), Some(&PING_ACK.to_vec()));
    }

    #[test]
    fn other_transport_overwrites_pending_delivery() {
        let (mut engine, uart, usb) = engine(fast_config());
        let mut rx_uart = engine.receiver(Transport::Uart);
        let mut rx_usb = engine.receiver(Transport::Usb);

        rx_uart.on_chunk(&PING_FRAME);
        rx_usb.on_chunk(&PING_FRAME);
        assert_eq!(engine.mailbox().overwritten(), 1);
        assert_eq!(engine.run_once().handled, 1);
        assert_eq!(uart.frame_count(), 0);
        assert_eq!(usb.take_frames(), vec![PING_ACK.to_vec()]);

        rx_usb.on_chunk(&PING_FRAME);
        rx_uart.on_chunk(&PING_FRAME);
        assert_eq!(engine.run_once().handled, 1);
        assert_eq!(usb.frame_count(), 0);
        assert_eq!(uart.take_frames(), vec![PING_ACK.to_vec()]);
    }

    #[test]
    fn frame_arriving_mid_dispatch_keeps_reply_route() {
        let config = EngineConfig {
            busy_retry_delay: Duration::ZERO,
            ..fast_config()
        };
        let (mut engine, uart, usb) = engine(config);
        let mut rx_uart = engine.receiver(Transport::Uart);
        let mut rx_usb = Some(engine.receiver(Transport::Usb));

        engine.handlers_mut().register(
            CommandId::Measurement,
            crate::handler_fn(move |request, emitter| {
                if let Some(mut rx) = rx_usb.take() {
                    rx.on_chunk(&PING_FRAME);
                    return Err(crate::HandlerError::Busy);
                }
                emitter.send_ack(
                    request.command_id(),
                    request.subcommand(),
                    AckKind::Ack,
                    crate::Direction::FireAndForget,
                );
                Ok(())
            }),
        );

        let mut body = vec![0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x00];
        hostlink_frame::append_crc(&mut body);
        let mut wire = bytes::BytesMut::new();
        hostlink_frame::encode_frame(&body, &mut wire);
        rx_uart.on_chunk(&wire);

        let cycle = engine.run_once();
        assert_eq!(cycle.handled, 2);

        let frames = uart.take_frames();
        assert_eq!(frames.len(), 1);
        let packet = FrameDecoder::new().push_slice(&frames[0]).remove(0).unwrap();
        let (envelope, _) = ResponseEnvelope::parse(&packet[..packet.len() - CRC_LEN]).unwrap();
        assert_eq!(envelope.command_id, CommandId::Measurement.as_u8());
        assert_eq!(envelope.ack, AckKind::Ack);
        assert_eq!(usb.take_frames(), vec![PING_ACK.to_vec()]);
    }

    #[test]
    fn noise_between_frames_is_ignored() {
        let (mut engine, uart, _) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);
        rx.on_chunk(&[0x00, 0x13, END, 0xFF]);
        assert!(!engine.mailbox().is_full());
        assert_eq!(engine.run_once(), Cycle::default());
        assert_eq!(uart.frame_count(), 0);
    }

    #[test]
    fn oversized_frame_is_nakd_as_overflow() {
        let config = EngineConfig {
            max_packet_size: 16,
            ..fast_config()
        };
        let (mut engine, uart, _) = engine(config);
        let mut rx = engine.receiver(Transport::Uart);

        rx.on_byte(START);
        rx.on_chunk(&[0x11; 17]);
        let cycle = engine.run_once();
        assert_eq!(cycle.rejected, 1);
        assert_eq!(nak_codes(&uart), vec![codes::BUFFER_OVERFLOW]);
    }

    #[test]
    fn run_once_times_out_quietly() {
        let (mut engine, _, _) = engine(fast_config());
        let started = Instant::now();
        let cycle = engine.run_once();
        assert_eq!(cycle, Cycle::default());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn periodic_bit_wakes_without_dispatch() {
        let (mut engine, _, _) = engine(fast_config());
        engine.notifier().notify(PERIODIC);
        let cycle = engine.run_once();
        assert_eq!(cycle.events, PERIODIC);
        assert_eq!(cycle.handled + cycle.rejected + cycle.ignored, 0);
    }

    #[test]
    fn run_loop_serves_until_stopped() {
        let (mut engine, uart, _) = engine(fast_config());
        let mut rx = engine.receiver(Transport::Uart);
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let worker = thread::spawn(move || engine.run(&flag));

        rx.on_chunk(&PING_FRAME);
        let deadline = Instant::now() + Duration::from_secs(5);
        while uart.frame_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        running.store(false, Ordering::SeqCst);
        worker.join().unwrap();

        assert_eq!(uart.take_frames(), vec![PING_ACK.to_vec()]);
    }

    #[test]
    fn stream_receiver_feeds_engine_until_eof() {
        let (mut engine, _, usb) = engine(fast_config());
        let rx = engine.receiver(Transport::Usb);
        let running = Arc::new(AtomicBool::new(true));

        let handle =
            spawn_stream_receiver(Cursor::new(PING_FRAME.to_vec()), rx, Arc::clone(&running))
                .unwrap();
        handle.join().unwrap();

        let cycle = engine.run_once();
        assert_eq!(cycle.handled, 1);
        let frames = usb.take_frames();
        let packet = FrameDecoder::new().push_slice(&frames[0]).remove(0).unwrap();
        let (envelope, _) = ResponseEnvelope::parse(&packet[..packet.len() - CRC_LEN]).unwrap();
        assert_eq!(envelope.ack, AckKind::Ack);
    }

    #[test]
    fn builtin_table_covers_three_families() {
        let table = builtin_handlers(&EngineConfig::default());
        assert!(table.is_registered(CommandId::Device));
        assert!(table.is_registered(CommandId::Info));
        assert!(table.is_registered(CommandId::System));
        assert!(!table.is_registered(CommandId::Measurement));
    }
}
