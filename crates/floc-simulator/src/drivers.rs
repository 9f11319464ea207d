//! Simulated hardware behind the floc-core ports
//!
//! Values follow slow sine curves driven by wall-clock time so the logs look
//! like a real tank over a compressed day.

use std::cell::Cell;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use embassy_time::Timer;
use embedded_hal::digital::{ErrorType, InputPin};
use heapless::Vec;
use log::{debug, info};

use floc_core::config::Region;
use floc_core::indicator::{Indicator, RgbColor};
use floc_core::lorawan::{LoRaRadio, OtaaCredentials, RadioSession};
use floc_core::sensors::{ClimateSample, ClimateSensor, OneWireBus};
use floc_core::state::{MAX_PUMP_PROBES, ProbeAddress};

/// Error reported by the simulated bus and radio
#[derive(Debug)]
pub enum SimError {
    /// Probe did not answer on the bus
    NoPresencePulse,
    /// Gateway did not acknowledge the uplink
    NoAck,
}

/// Shared switch position, flipped by the tank scenario
pub struct TankLevel {
    high: AtomicBool,
}

impl TankLevel {
    pub const fn new(high: bool) -> Self {
        Self {
            high: AtomicBool::new(high),
        }
    }

    pub fn set(&self, high: bool) {
        self.high.store(high, Ordering::Relaxed);
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Relaxed)
    }
}

pub struct SimLevelSwitch {
    level: &'static TankLevel,
}

impl SimLevelSwitch {
    pub const fn new(level: &'static TankLevel) -> Self {
        Self { level }
    }
}

impl ErrorType for SimLevelSwitch {
    type Error = Infallible;
}

impl InputPin for SimLevelSwitch {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.is_high())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.is_high())
    }
}

/// One-wire bus with two connected pump probes and one unplugged probe
pub struct SimOneWire {
    started: Instant,
    reads: u32,
}

impl SimOneWire {
    const PROBES: [ProbeAddress; 3] = [
        ProbeAddress(0x28FF_6412_0417_03A1),
        ProbeAddress(0x28FF_6412_0417_03B2),
        ProbeAddress(0x28FF_6412_0417_03C3),
    ];
    /// Index of the probe with its cable pulled
    const UNPLUGGED: usize = 2;

    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            reads: 0,
        }
    }
}

impl Default for SimOneWire {
    fn default() -> Self {
        Self::new()
    }
}

impl OneWireBus for SimOneWire {
    type Error = SimError;

    async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PUMP_PROBES>, SimError> {
        Ok(Self::PROBES.iter().copied().collect())
    }

    async fn start_conversion(&mut self, _probe: ProbeAddress) -> Result<(), SimError> {
        Ok(())
    }

    async fn read_temperature(&mut self, probe: ProbeAddress) -> Result<f32, SimError> {
        self.reads = self.reads.wrapping_add(1);
        let Some(index) = Self::PROBES.iter().position(|p| *p == probe) else {
            return Err(SimError::NoPresencePulse);
        };
        if index == Self::UNPLUGGED {
            // What a DS18B20 without its data line reports
            return Ok(-0.1);
        }
        // Occasional CRC-style glitch on the first probe
        if index == 0 && self.reads % 17 == 0 {
            return Err(SimError::NoPresencePulse);
        }

        let t = self.started.elapsed().as_secs_f64();
        let celsius = 35.0 + 6.0 * (t / 40.0 + index as f64).sin();
        Ok(celsius as f32)
    }
}

/// DHT11 that fails its checksum every few reads
pub struct SimClimate {
    started: Instant,
    reads: u32,
}

impl SimClimate {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            reads: 0,
        }
    }
}

impl Default for SimClimate {
    fn default() -> Self {
        Self::new()
    }
}

impl ClimateSensor for SimClimate {
    type Error = Infallible;

    async fn read(&mut self) -> Result<ClimateSample, Infallible> {
        self.reads = self.reads.wrapping_add(1);
        let t = self.started.elapsed().as_secs_f64();
        Ok(ClimateSample {
            temperature: (18.0 + 4.0 * (t / 60.0).sin()) as f32,
            humidity: (65.0 + 10.0 * (t / 90.0).cos()) as f32,
            valid: self.reads % 4 != 0,
        })
    }
}

/// RGB LED that prints its color
pub struct SimLed;

impl Indicator for SimLed {
    type Error = Infallible;

    fn show(&mut self, color: RgbColor) -> Result<(), Infallible> {
        info!("LED -> #{:06X}", color.0);
        Ok(())
    }
}

/// LoRaWAN radio that needs a few polls to join, drops every fourth uplink
/// and answers every third successful one with a downlink.
pub struct SimRadio {
    region: Region,
    join_polls: Cell<u32>,
    joined_after: u32,
    uplinks: u32,
}

impl SimRadio {
    pub fn new(region: Region, joined_after: u32) -> Self {
        Self {
            region,
            join_polls: Cell::new(0),
            joined_after,
            uplinks: 0,
        }
    }
}

pub struct SimSession<'s> {
    radio: &'s mut SimRadio,
    data_rate: u8,
    blocking: bool,
    downlink_pending: bool,
}

impl LoRaRadio for SimRadio {
    type Error = SimError;
    type Session<'s>
        = SimSession<'s>
    where
        Self: 's;

    async fn join(&mut self, credentials: &OtaaCredentials) -> Result<(), SimError> {
        info!(
            "Radio: {:?} join request sent for {:?}",
            self.region, credentials
        );
        Timer::after_millis(200).await;
        Ok(())
    }

    fn has_joined(&self) -> bool {
        let polls = self.join_polls.get() + 1;
        self.join_polls.set(polls);
        polls >= self.joined_after
    }

    fn open(&mut self) -> Result<SimSession<'_>, SimError> {
        Ok(SimSession {
            radio: self,
            data_rate: 0,
            blocking: false,
            downlink_pending: false,
        })
    }
}

impl RadioSession for SimSession<'_> {
    type Error = SimError;

    fn set_data_rate(&mut self, data_rate: u8) -> Result<(), SimError> {
        self.data_rate = data_rate;
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) -> Result<(), SimError> {
        self.blocking = blocking;
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SimError> {
        // Airtime at the configured data rate
        Timer::after_millis(50).await;
        self.radio.uplinks = self.radio.uplinks.wrapping_add(1);
        let uplink = self.radio.uplinks;
        if uplink % 4 == 0 {
            return Err(SimError::NoAck);
        }
        debug!(
            "Radio: DR{} uplink #{} {:02X?} (blocking: {})",
            self.data_rate, uplink, payload, self.blocking
        );
        self.downlink_pending = uplink % 3 == 0;
        Ok(())
    }

    async fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, SimError> {
        if !self.downlink_pending || buffer.len() < 2 {
            return Ok(0);
        }
        self.downlink_pending = false;
        // Gateway asks for a 300 s uplink interval
        buffer[..2].copy_from_slice(&[0x01, 0x2C]);
        Ok(2)
    }
}
