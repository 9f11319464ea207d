//! Node configuration
//!
//! Every interval and policy used by the node lives here. The defaults are
//! the values the deployed firmware runs with; tests and the simulator
//! shorten them.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct NodeConfig<'a> {
    pub credentials: CredentialsHex<'a>,
    /// Not used by the core. The board passes it to its radio adapter.
    pub region: Region,
    pub air_pump: AirPumpConfig,
    pub ambient: AmbientConfig,
    pub fluid_level: FluidLevelConfig,
    pub uplink: UplinkConfig,
    pub supervisor: SupervisorConfig,
}

/// Hex-encoded OTAA credentials as provisioned for the device
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct CredentialsHex<'a> {
    pub dev_eui: &'a str,
    pub app_eui: &'a str,
    pub app_key: &'a str,
}

/// LoRaWAN regional parameters the radio adapter is constructed with
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Eu868,
    Us915,
    Au915,
    As923,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirPumpConfig {
    /// DS18X20 conversion settle time
    pub conversion_ms: u64,
    /// Minimum duration of one pass over all probes, 0 for no floor
    pub min_cycle_ms: u64,
    /// Raw value (tenths of a degree) a disconnected probe reports, `None` to trust every value
    pub disconnected_sentinel_deci: Option<i16>,
}

impl AirPumpConfig {
    pub const fn conversion_time(&self) -> Duration {
        Duration::from_millis(self.conversion_ms)
    }

    pub const fn min_cycle(&self) -> Duration {
        Duration::from_millis(self.min_cycle_ms)
    }
}

impl Default for AirPumpConfig {
    fn default() -> Self {
        Self {
            conversion_ms: 1000,
            min_cycle_ms: 0,
            disconnected_sentinel_deci: Some(-1),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientConfig {
    /// Warm-up time before the first read
    pub settle_ms: u64,
    /// Delay after a committed reading
    pub interval_ms: u64,
    /// Backoff for invalid reads
    pub retry: RetryPolicy,
}

impl AmbientConfig {
    pub const fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            settle_ms: 2000,
            interval_ms: 5000,
            retry: RetryPolicy::forever(500),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluidLevelConfig {
    pub interval_ms: u64,
}

impl FluidLevelConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for FluidLevelConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

/// Payload layout sent over the air
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UplinkFormat {
    /// Fixed 5 bytes understood by the existing receiving system
    #[default]
    Legacy,
    /// Versioned postcard record carrying every probe
    Framed,
}

/// What to do when fewer than two pump readings are available
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialReadingPolicy {
    /// Send anyway with the no-data marker in the missing slots
    #[default]
    FillNoData,
    /// Skip the uplink cycle
    SkipCycle,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkConfig {
    pub data_rate: u8,
    /// Delay between uplink cycles
    pub interval_ms: u64,
    /// Polling of the radio's joined status
    pub join_poll: RetryPolicy,
    pub format: UplinkFormat,
    pub partial_policy: PartialReadingPolicy,
}

impl UplinkConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            data_rate: 5,
            interval_ms: 30 * 60 * 1000,
            join_poll: RetryPolicy::forever(2500),
            format: UplinkFormat::Legacy,
            partial_policy: PartialReadingPolicy::FillNoData,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time the samplers get to produce first values before the uplink starts
    pub settle_ms: u64,
    /// Period of the state log
    pub log_interval_ms: u64,
    /// Delay before a failed task is restarted
    pub restart_delay_ms: u64,
}

impl SupervisorConfig {
    pub const fn settle_time(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub const fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            settle_ms: 5000,
            log_interval_ms: 60_000,
            restart_delay_ms: 1000,
        }
    }
}
