//! Shared telemetry state
//!
//! Samplers write into a single [`SharedTelemetryState`] and readers take a
//! [`TelemetrySnapshot`]. Every write and every snapshot run inside one short
//! critical section, so a snapshot can never mix fields from two different
//! update generations. No lock is held across an await point.

mod readings;

pub use readings::*;

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use log::warn;

/// Maximum number of pump probes tracked on the one-wire bus
pub const MAX_PUMP_PROBES: usize = 8;

pub type PumpReadings = Vec<TemperatureReading, MAX_PUMP_PROBES>;

struct TelemetryFields {
    fluid_level: Option<FluidLevel>,
    climate: Option<ClimateReading>,
    /// Ordered by probe discovery
    pumps: PumpReadings,
    generation: u32,
}

/// Consistent copy of all readings taken at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fluid_level: Option<FluidLevel>,
    pub climate: Option<ClimateReading>,
    pub pumps: PumpReadings,
    /// Number of committed writes since boot
    pub generation: u32,
}

impl TelemetrySnapshot {
    /// Measured pump temperatures in discovery order, `None` for unavailable probes
    pub fn pump_values(&self) -> impl Iterator<Item = Option<DeciCelsius>> + '_ {
        self.pumps.iter().map(|reading| reading.value.measured())
    }

    pub fn pump(&self, probe: ProbeAddress) -> Option<ProbeValue> {
        self.pumps
            .iter()
            .find(|reading| reading.probe == probe)
            .map(|reading| reading.value)
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fluid_level {
            Some(level) => write!(f, "floc level: {:?}", level)?,
            None => f.write_str("floc level: n/a")?,
        }
        match &self.climate {
            Some(climate) => {
                f.write_str(" | ambient: ")?;
                write_milli(f, climate.temperature_milli_celsius)?;
                f.write_str(" C, ")?;
                write_milli(f, climate.humidity_milli_percent)?;
                f.write_str(" %")?;
            }
            None => f.write_str(" | ambient: n/a")?,
        }
        f.write_str(" | air pumps:")?;
        if self.pumps.is_empty() {
            f.write_str(" none")?;
        }
        for reading in &self.pumps {
            write!(f, " [{}: {}]", reading.probe, reading.value)?;
        }
        Ok(())
    }
}

fn write_milli(f: &mut fmt::Formatter<'_>, value: i32) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    write!(f, "{}{}.{:03}", sign, magnitude / 1000, magnitude % 1000)
}

/// Single source of truth for the latest reading of each sensor
pub struct SharedTelemetryState {
    fields: Mutex<CriticalSectionRawMutex, RefCell<TelemetryFields>>,
    /// Latest fluid level for the indicator observer
    fluid_level_changed: Signal<CriticalSectionRawMutex, FluidLevel>,
}

impl SharedTelemetryState {
    pub const fn new() -> Self {
        Self {
            fields: Mutex::new(RefCell::new(TelemetryFields {
                fluid_level: None,
                climate: None,
                pumps: Vec::new(),
                generation: 0,
            })),
            fluid_level_changed: Signal::new(),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut TelemetryFields) -> R) -> R {
        self.fields.lock(|cell| {
            let mut fields = cell.borrow_mut();
            let result = f(&mut fields);
            fields.generation = fields.generation.wrapping_add(1);
            result
        })
    }

    /// Create `Unavailable` slots for newly discovered probes, in discovery order.
    pub fn register_probes(&self, probes: &[ProbeAddress]) {
        self.update(|fields| {
            for &probe in probes {
                if fields.pumps.iter().any(|reading| reading.probe == probe) {
                    continue;
                }
                if fields
                    .pumps
                    .push(TemperatureReading::unavailable(probe))
                    .is_err()
                {
                    warn!("No slot left for probe {}, ignoring it", probe);
                }
            }
        });
    }

    /// Replace the reading of one probe, adding a slot if it is new.
    pub fn set_pump_temp(&self, reading: TemperatureReading) {
        self.update(|fields| {
            if let Some(slot) = fields
                .pumps
                .iter_mut()
                .find(|slot| slot.probe == reading.probe)
            {
                *slot = reading;
            } else if fields.pumps.push(reading).is_err() {
                warn!("No slot left for probe {}, dropping reading", reading.probe);
            }
        });
    }

    pub fn set_climate(&self, reading: ClimateReading) {
        self.update(|fields| fields.climate = Some(reading));
    }

    pub fn set_fluid_level(&self, level: FluidLevel) {
        self.update(|fields| fields.fluid_level = Some(level));
        self.fluid_level_changed.signal(level);
    }

    /// Copy every field under one critical section.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.fields.lock(|cell| {
            let fields = cell.borrow();
            TelemetrySnapshot {
                fluid_level: fields.fluid_level,
                climate: fields.climate,
                pumps: fields.pumps.clone(),
                generation: fields.generation,
            }
        })
    }

    /// Wait for the next fluid level write.
    ///
    /// Only one task may wait on this; intermediate values are coalesced and
    /// the latest one wins.
    pub async fn wait_fluid_level(&self) -> FluidLevel {
        self.fluid_level_changed.wait().await
    }
}

impl Default for SharedTelemetryState {
    fn default() -> Self {
        Self::new()
    }
}
