use hostlink_engine::{Direction, DomainHandler, HandlerError, Request, ResponseEmitter};

pub const READ_CHANNEL: u8 = 0x01;
pub const READ_ALL: u8 = 0x02;

/// Fixed readings served by [`SimulatedMeasurement`]: (channel, name, value).
pub const CHANNELS: [(u8, &str, u16); 4] = [
    (0, "battery_mv", 14_800),
    (1, "left_wheel_ma", 320),
    (2, "right_wheel_ma", 315),
    (3, "dust_level", 42),
];

/// Measurement family backed by constant channel values.
///
/// With `busy > 0` every request is answered busy on its first `busy`
/// attempts before the reading is served.
#[derive(Debug, Clone)]
pub struct SimulatedMeasurement {
    busy: u32,
    busy_left: u32,
}

impl SimulatedMeasurement {
    pub fn new(busy: u32) -> Self {
        Self {
            busy,
            busy_left: busy,
        }
    }
}

impl DomainHandler for SimulatedMeasurement {
    fn handle(
        &mut self,
        request: &Request<'_>,
        emitter: &mut ResponseEmitter,
    ) -> Result<(), HandlerError> {
        if request.attempt <= 1 {
            self.busy_left = self.busy;
        }
        if self.busy_left > 0 {
            self.busy_left -= 1;
            return Err(HandlerError::Busy);
        }

        match request.subcommand() {
            READ_CHANNEL => {
                let channel = *request
                    .args
                    .first()
                    .ok_or(HandlerError::InvalidArgument("missing channel"))?;
                let (_, _, value) = CHANNELS
                    .iter()
                    .find(|(id, _, _)| *id == channel)
                    .ok_or(HandlerError::InvalidArgument("unknown channel"))?;
                let [lo, hi] = value.to_le_bytes();
                emitter.send_reply(
                    request.command_id(),
                    READ_CHANNEL,
                    Direction::DataReply,
                    &[channel, lo, hi],
                );
            }
            READ_ALL => {
                let mut data = Vec::with_capacity(1 + 2 * CHANNELS.len());
                data.push(CHANNELS.len() as u8);
                for (_, _, value) in CHANNELS {
                    data.extend_from_slice(&value.to_le_bytes());
                }
                emitter.send_reply(request.command_id(), READ_ALL, Direction::DataReply, &data);
            }
            other => return Err(HandlerError::UnknownSubcommand(other)),
        }
        Ok(())
    }
}
