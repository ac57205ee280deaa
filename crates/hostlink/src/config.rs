use std::path::Path;
use std::time::Duration;

use hostlink_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::exit::{io_error, CliError, CliResult, CONFIG_INVALID};

/// Engine settings as stored on disk. Missing fields keep their defaults.
///
/// ```json
/// { "device_address": 66, "busy_retry_limit": 5, "busy_retry_delay_ms": 20 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub device_address: Option<u16>,
    pub device_class: Option<u16>,
    pub max_packet_size: Option<usize>,
    pub busy_retry_limit: Option<u32>,
    pub busy_retry_delay_ms: Option<u64>,
    pub wait_timeout_ms: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        Self::parse(&text)
            .map_err(|err| CliError::new(CONFIG_INVALID, format!("{}: {err}", path.display())))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Overlay these settings on the defaults.
    pub fn to_engine_config(&self) -> CliResult<EngineConfig> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            device_address: self.device_address.unwrap_or(defaults.device_address),
            device_class: self.device_class.unwrap_or(defaults.device_class),
            max_packet_size: self.max_packet_size.unwrap_or(defaults.max_packet_size),
            busy_retry_limit: self.busy_retry_limit.unwrap_or(defaults.busy_retry_limit),
            busy_retry_delay: self
                .busy_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_retry_delay),
            wait_timeout: self
                .wait_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.wait_timeout),
        };

        if config.max_packet_size < 16 {
            return Err(CliError::new(
                CONFIG_INVALID,
                format!("max_packet_size {} is below 16", config.max_packet_size),
            ));
        }
        if config.busy_retry_limit == 0 {
            return Err(CliError::new(
                CONFIG_INVALID,
                "busy_retry_limit must be at least 1",
            ));
        }
        Ok(config)
    }
}

/// Load `path` if given, apply an optional address override, and build the
/// engine configuration.
pub fn resolve(path: Option<&Path>, address: Option<u16>) -> CliResult<EngineConfig> {
    let mut file = match path {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    if address.is_some() {
        file.device_address = address;
    }
    file.to_engine_config()
}
