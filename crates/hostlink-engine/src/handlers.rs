//! Built-in handlers for the device, info and system families.

use std::time::Instant;

use crate::dispatcher::{DomainHandler, Request};
use crate::emitter::ResponseEmitter;
use crate::envelope::{AckKind, Direction};
use crate::error::HandlerError;

pub const DEVICE_PING: u8 = 0x01;
pub const DEVICE_IDENTIFY: u8 = 0x02;

pub const INFO_FIRMWARE_VERSION: u8 = 0x01;
pub const INFO_LIMITS: u8 = 0x02;

pub const SYSTEM_UPTIME: u8 = 0x01;
pub const SYSTEM_ECHO: u8 = 0x02;

/// Ping and identify.
#[derive(Debug, Clone)]
pub struct DeviceHandler {
    address: u16,
    device_class: u16,
}

impl DeviceHandler {
    pub fn new(address: u16, device_class: u16) -> Self {
        Self {
            address,
            device_class,
        }
    }
}

impl DomainHandler for DeviceHandler {
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> Result<(), HandlerError> {
        match request.subcommand() {
            DEVICE_PING => {
                emitter.send_ack(
                    request.command_id(),
                    DEVICE_PING,
                    AckKind::Ack,
                    Direction::FireAndForget,
                );
            }
            DEVICE_IDENTIFY => {
                let mut data = [0u8; 4];
                data[..2].copy_from_slice(&self.address.to_le_bytes());
                data[2..].copy_from_slice(&self.device_class.to_le_bytes());
                emitter.send_reply(
                    request.command_id(),
                    DEVICE_IDENTIFY,
                    Direction::DataReply,
                    &data,
                );
            }
            other => return Err(HandlerError::UnknownSubcommand(other)),
        }
        Ok(())
    }
}

/// Firmware version reported by [`InfoHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    /// Version of this build.
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Firmware version and protocol limits.
#[derive(Debug, Clone)]
pub struct InfoHandler {
    version: FirmwareVersion,
    max_packet_size: u16,
}

impl InfoHandler {
    pub fn new(version: FirmwareVersion, max_packet_size: usize) -> Self {
        Self {
            version,
            max_packet_size: u16::try_from(max_packet_size).unwrap_or(u16::MAX),
        }
    }
}

impl DomainHandler for InfoHandler {
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> Result<(), HandlerError> {
        match request.subcommand() {
            INFO_FIRMWARE_VERSION => emitter.send_reply(
                request.command_id(),
                INFO_FIRMWARE_VERSION,
                Direction::DataReply,
                &self.version.to_bytes(),
            ),
            INFO_LIMITS => emitter.send_reply(
                request.command_id(),
                INFO_LIMITS,
                Direction::DataReply,
                &self.max_packet_size.to_le_bytes(),
            ),
            other => return Err(HandlerError::UnknownSubcommand(other)),
        }
        Ok(())
    }
}

/// Uptime and echo.
#[derive(Debug, Clone)]
pub struct SystemHandler {
    started: Instant,
}

impl SystemHandler {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds since creation, saturating at `u32::MAX`.
    pub fn uptime_ms(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_millis()).unwrap_or(u32::MAX)
    }
}

impl Default for SystemHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainHandler for SystemHandler {
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> Result<(), HandlerError> {
        match request.subcommand() {
            SYSTEM_UPTIME => emitter.send_reply(
                request.command_id(),
                SYSTEM_UPTIME,
                Direction::DataReply,
                &self.uptime_ms().to_le_bytes(),
            ),
            SYSTEM_ECHO => {
                if request.args.len() > emitter.max_reply_data() {
                    return Err(HandlerError::InvalidArgument("echo payload too large"));
                }
                emitter.send_reply(
                    request.command_id(),
                    SYSTEM_ECHO,
                    Direction::DataReply,
                    request.args,
                );
            }
            other => return Err(HandlerError::UnknownSubcommand(other)),
        }
        Ok(())
    }
}
