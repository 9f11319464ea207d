//! Reading types stored in the shared telemetry state

use core::fmt;

use serde::{Deserialize, Serialize};

/// One-wire ROM code identifying a probe on the bus
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeAddress(pub u64);

impl fmt::Debug for ProbeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProbeAddress({:016X})", self.0)
    }
}

impl fmt::Display for ProbeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Offset a scaled value so the following `as` cast rounds half away from zero
fn round_half_away(scaled: f32) -> f32 {
    if scaled >= 0.0 {
        scaled + 0.5
    } else {
        scaled - 0.5
    }
}

/// Temperature in tenths of a degree Celsius
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeciCelsius(pub i16);

impl DeciCelsius {
    /// Round a raw probe value to one decimal place (half away from zero).
    pub fn from_celsius(celsius: f32) -> Self {
        // `as` saturates at the i16 bounds
        Self(round_half_away(celsius * 10.0) as i16)
    }

    /// Whole degrees, truncated toward zero
    pub const fn whole_degrees(self) -> i16 {
        self.0 / 10
    }
}

impl fmt::Display for DeciCelsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, magnitude / 10, magnitude % 10)
    }
}

/// Latest value of a single pump probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeValue {
    Measured(DeciCelsius),
    /// The probe reported itself disconnected or could not be read
    Unavailable,
}

impl ProbeValue {
    pub const fn measured(self) -> Option<DeciCelsius> {
        match self {
            Self::Measured(value) => Some(value),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured(value) => write!(f, "{} C", value),
            Self::Unavailable => f.write_str("n/a"),
        }
    }
}

/// Pump temperature reading keyed by probe identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    pub probe: ProbeAddress,
    pub value: ProbeValue,
}

impl TemperatureReading {
    pub const fn unavailable(probe: ProbeAddress) -> Self {
        Self {
            probe,
            value: ProbeValue::Unavailable,
        }
    }
}

/// Committed ambient temperature and humidity, in milli-units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimateReading {
    pub temperature_milli_celsius: i32,
    pub humidity_milli_percent: i32,
}

impl ClimateReading {
    /// Scale driver floats to milli-units, rounding to the nearest unit.
    pub fn from_float(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature_milli_celsius: round_half_away(temperature * 1000.0) as i32,
            humidity_milli_percent: round_half_away(humidity * 1000.0) as i32,
        }
    }

    /// Whole degrees Celsius, truncated toward zero
    pub const fn whole_degrees(&self) -> i32 {
        self.temperature_milli_celsius / 1000
    }

    /// Whole percent relative humidity, truncated toward zero
    pub const fn whole_percent(&self) -> i32 {
        self.humidity_milli_percent / 1000
    }
}

/// Flocculation fluid level reported by the level switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluidLevel {
    /// Switch input is at its inactive level: the tank needs refilling
    Low,
    Ok,
}

impl FluidLevel {
    /// Classify a single digital read of the level switch.
    pub const fn from_input(is_high: bool) -> Self {
        if is_high { Self::Ok } else { Self::Low }
    }

    /// Value used on the wire: 0 for low, 1 for ok
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Ok => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::format;

    #[test]
    fn test_rounds_to_one_decimal() {
        assert_eq!(DeciCelsius::from_celsius(18.3), DeciCelsius(183));
        assert_eq!(DeciCelsius::from_celsius(19.94), DeciCelsius(199));
        assert_eq!(DeciCelsius::from_celsius(19.96), DeciCelsius(200));
        assert_eq!(DeciCelsius::from_celsius(-0.1), DeciCelsius(-1));
        assert_eq!(DeciCelsius::from_celsius(-12.46), DeciCelsius(-125));
    }

    #[test]
    fn test_whole_degrees_truncate_toward_zero() {
        assert_eq!(DeciCelsius(199).whole_degrees(), 19);
        assert_eq!(DeciCelsius(-37).whole_degrees(), -3);
        let climate = ClimateReading::from_float(22.7, 55.4);
        assert_eq!(climate.whole_degrees(), 22);
        assert_eq!(climate.whole_percent(), 55);
    }

    #[test]
    fn test_climate_milli_units_round_to_nearest() {
        let climate = ClimateReading::from_float(16.3, 32.1);
        assert_eq!(climate.temperature_milli_celsius, 16300);
        assert_eq!(climate.humidity_milli_percent, 32100);

        let climate = ClimateReading::from_float(-16.3, 0.0);
        assert_eq!(climate.temperature_milli_celsius, -16300);
        assert_eq!(climate.humidity_milli_percent, 0);

        for tenths in -400..=1000 {
            let celsius = tenths as f32 / 10.0;
            let climate = ClimateReading::from_float(celsius, celsius);
            assert_eq!(climate.temperature_milli_celsius, tenths * 100, "{}", celsius);
        }
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(format!("{}", DeciCelsius(-5)), "-0.5");
        assert_eq!(format!("{}", DeciCelsius(215)), "21.5");
        assert_eq!(
            format!("{}", ProbeAddress(0x28FF_0011_2233_4455)),
            "28FF001122334455"
        );
        assert_eq!(format!("{}", ProbeValue::Unavailable), "n/a");
    }

    #[test]
    fn test_fluid_level_classification() {
        assert_eq!(FluidLevel::from_input(false), FluidLevel::Low);
        assert_eq!(FluidLevel::from_input(true), FluidLevel::Ok);
        assert_eq!(FluidLevel::Low.wire_value(), 0);
        assert_eq!(FluidLevel::Ok.wire_value(), 1);
    }
}
