//! Command engine for the host link.
//!
//! Receive contexts decode frames into a single-slot [`Mailbox`]; the worker
//! ([`ProtocolEngine`]) validates each packet, routes it to the handler for
//! its command family and replies on the transport it arrived on.

pub mod config;
pub mod dispatcher;
pub mod emitter;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod mailbox;
pub mod notify;
pub mod router;

pub use config::{EngineConfig, RetryPolicy};
pub use dispatcher::{
    handler_fn, CommandDispatcher, Dispatch, DomainHandler, HandlerTable, Request,
};
pub use emitter::ResponseEmitter;
pub use engine::{builtin_handlers, spawn_stream_receiver, Cycle, ProtocolEngine, Receiver};
pub use envelope::{
    command_name, AckKind, CommandId, Direction, RequestEnvelope, ResponseEnvelope, BROADCAST,
};
pub use error::{codes, DispatchError, HandlerError, Result};
pub use handlers::{DeviceHandler, FirmwareVersion, InfoHandler, SystemHandler};
pub use mailbox::{Delivery, Mailbox};
pub use notify::Notifier;
pub use router::TransportRouter;
