//! Sensor ports and the samplers that poll them
//!
//! Each sampler owns its driver and writes into the shared telemetry state.
//! Drivers are reached only through the traits below (or `embedded-hal`
//! digital traits), so the bus-level protocols stay outside this crate.

pub mod air_pump;
pub mod ambient;
pub mod fluid_level;

pub use air_pump::AirPumpSampler;
pub use ambient::AmbientSampler;
pub use fluid_level::FluidLevelSampler;

use core::fmt::Debug;
use core::future::Future;

use heapless::Vec;

use crate::state::{MAX_PUMP_PROBES, ProbeAddress};

/// Bus carrying DS18X20-style temperature probes.
///
/// # Example Implementation
///
/// ```ignore
/// impl<P: InputPin + OutputPin> OneWireBus for Ds18x20Bus<P> {
///     type Error = OneWireError;
///
///     async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PUMP_PROBES>, Self::Error> {
///         let mut found = Vec::new();
///         for rom in self.bus.devices(false, &mut self.delay) {
///             let _ = found.push(ProbeAddress(rom?.0));
///         }
///         Ok(found)
///     }
///     // ...
/// }
/// ```
pub trait OneWireBus {
    type Error: Debug;

    /// Enumerate the probes on the bus
    fn scan(
        &mut self,
    ) -> impl Future<Output = Result<Vec<ProbeAddress, MAX_PUMP_PROBES>, Self::Error>>;

    /// Ask one probe to start a temperature conversion
    fn start_conversion(
        &mut self,
        probe: ProbeAddress,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Read the last converted temperature in degrees Celsius.
    ///
    /// A disconnected probe may report a fixed sentinel value instead of failing.
    fn read_temperature(
        &mut self,
        probe: ProbeAddress,
    ) -> impl Future<Output = Result<f32, Self::Error>>;
}

/// Raw result of one ambient sensor read, valid or not
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    pub temperature: f32,
    pub humidity: f32,
    pub valid: bool,
}

impl ClimateSample {
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Combined temperature/humidity sensor (DHT11 class)
pub trait ClimateSensor {
    type Error: Debug;

    fn read(&mut self) -> impl Future<Output = Result<ClimateSample, Self::Error>>;
}
