//! Fluid level indicator
//!
//! The mapping from fluid level to a visual signal is pure; the
//! [`IndicatorTask`] observer applies it to an [`Indicator`] port whenever
//! the fluid level sampler commits a new value.

use core::fmt::Debug;

use embassy_futures::select::{Either, select};
use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::error::NodeError;
use crate::state::{FluidLevel, SharedTelemetryState};
use crate::task::{NodeTask, ShutdownSignal, TaskId, wait_shutdown};

/// 24-bit RGB color, `0xRRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor(pub u32);

impl RgbColor {
    pub const OFF: Self = Self(0x000000);
    pub const ALERT_RED: Self = Self(0xFF0000);

    pub const fn is_off(self) -> bool {
        self.0 & 0xFF_FFFF == 0
    }
}

/// Visual signal shown for a fluid level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorSignal {
    /// Tank needs refilling
    Alert,
    Off,
}

impl IndicatorSignal {
    pub const fn color(self) -> RgbColor {
        match self {
            Self::Alert => RgbColor::ALERT_RED,
            Self::Off => RgbColor::OFF,
        }
    }
}

pub struct IndicatorController;

impl IndicatorController {
    pub const fn signal_for(level: FluidLevel) -> IndicatorSignal {
        match level {
            FluidLevel::Low => IndicatorSignal::Alert,
            FluidLevel::Ok => IndicatorSignal::Off,
        }
    }
}

/// Something that can show a color: an RGB LED, a single LED, a display badge
pub trait Indicator {
    type Error: Debug;

    fn show(&mut self, color: RgbColor) -> Result<(), Self::Error>;
}

/// Single-color LED on a GPIO, lit for any color except black
pub struct PinIndicator<P: OutputPin> {
    pin: P,
}

impl<P: OutputPin> PinIndicator<P> {
    pub const fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> Indicator for PinIndicator<P> {
    type Error = P::Error;

    fn show(&mut self, color: RgbColor) -> Result<(), Self::Error> {
        if color.is_off() {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        }
    }
}

/// Observer that keeps the indicator in line with the committed fluid level.
pub struct IndicatorTask<'a, I: Indicator> {
    indicator: I,
    state: &'a SharedTelemetryState,
    last: Option<IndicatorSignal>,
}

impl<'a, I: Indicator> IndicatorTask<'a, I> {
    pub fn new(indicator: I, state: &'a SharedTelemetryState) -> Self {
        Self {
            indicator,
            state,
            last: None,
        }
    }

    /// Show the signal for `level`, writing the port only when it changes.
    pub fn apply(&mut self, level: FluidLevel) -> Result<IndicatorSignal, NodeError> {
        let signal = IndicatorController::signal_for(level);
        if self.last == Some(signal) {
            return Ok(signal);
        }

        self.indicator.show(signal.color()).map_err(|e| {
            warn!("Indicator write failed: {:?}", e);
            NodeError::BusFault {
                sensor: "indicator",
                operation: "show",
            }
        })?;
        info!("Fluid level {:?}, indicator {:?}", level, signal);
        self.last = Some(signal);
        Ok(signal)
    }
}

impl<I: Indicator> NodeTask for IndicatorTask<'_, I> {
    const ID: TaskId = TaskId::Indicator;

    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), NodeError> {
        // Catch up with a level committed before this task (re)started
        if let Some(level) = self.state.snapshot().fluid_level {
            self.apply(level)?;
        }

        loop {
            match select(self.state.wait_fluid_level(), wait_shutdown(shutdown)).await {
                Either::First(level) => {
                    self.apply(level)?;
                }
                Either::Second(()) => return Ok(()),
            }
        }
    }
}
