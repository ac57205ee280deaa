use std::time::Duration;

use hostlink_frame::DEFAULT_MAX_PACKET;

/// Default number of handler invocations for a request that keeps reporting busy.
pub const DEFAULT_BUSY_RETRY_LIMIT: u32 = 10;

/// Default pause between busy retries.
pub const DEFAULT_BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Default bound on the worker's notification wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Runtime configuration of a [`crate::ProtocolEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// This device's address on the host bus. Requests for other non-zero
    /// addresses are dropped silently.
    pub device_address: u16,
    /// Device class reported by the identify command.
    pub device_class: u16,
    /// Largest packet (payload + CRC) assembled or emitted.
    pub max_packet_size: usize,
    /// Total handler invocations allowed while it reports busy.
    pub busy_retry_limit: u32,
    /// Delay between busy retries.
    pub busy_retry_delay: Duration,
    /// Longest the worker sleeps without a notification.
    pub wait_timeout: Duration,
}

impl EngineConfig {
    /// Busy retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.busy_retry_limit.max(1),
            delay: self.busy_retry_delay,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_address: 0,
            device_class: 0,
            max_packet_size: DEFAULT_MAX_PACKET,
            busy_retry_limit: DEFAULT_BUSY_RETRY_LIMIT,
            busy_retry_delay: DEFAULT_BUSY_RETRY_DELAY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Bounded retry for handlers that report a transient busy condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations, including the first. Never zero.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        EngineConfig::default().retry_policy()
    }
}
