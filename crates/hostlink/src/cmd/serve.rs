use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hostlink_engine::{spawn_stream_receiver, CommandId, ProtocolEngine};
use hostlink_transport::{SerialDevice, Transport, TransportSet};
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::config;
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::sim::SimulatedMeasurement;

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = config::resolve(args.config.as_deref(), args.address)?;

    let uart = SerialDevice::open(&args.uart, args.baud)
        .map_err(|err| transport_error("failed opening uart", err))?;
    let usb = SerialDevice::open(&args.usb, args.baud)
        .map_err(|err| transport_error("failed opening usb", err))?;
    let (uart_reader, uart_link) = uart
        .split()
        .map_err(|err| transport_error("failed splitting uart", err))?;
    let (usb_reader, usb_link) = usb
        .split()
        .map_err(|err| transport_error("failed splitting usb", err))?;

    let links = TransportSet::new()
        .with(Transport::Uart, uart_link)
        .with(Transport::Usb, usb_link);
    let mut engine = ProtocolEngine::with_builtin_handlers(config, links);
    engine
        .handlers_mut()
        .register(CommandId::Measurement, SimulatedMeasurement::new(0));

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let receivers = [
        spawn_stream_receiver(
            uart_reader,
            engine.receiver(Transport::Uart),
            Arc::clone(&running),
        ),
        spawn_stream_receiver(
            usb_reader,
            engine.receiver(Transport::Usb),
            Arc::clone(&running),
        ),
    ];
    let mut handles = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        match receiver {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                running.store(false, Ordering::SeqCst);
                return Err(io_error("failed starting receiver", err));
            }
        }
    }

    info!(uart = %args.uart, usb = %args.usb, "serving host link");
    engine.run(&running);

    running.store(false, Ordering::SeqCst);
    for handle in handles {
        if handle.join().is_err() {
            warn!("receiver thread panicked");
        }
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
