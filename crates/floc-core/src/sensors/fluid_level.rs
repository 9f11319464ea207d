//! Flocculation fluid level sampler

use embedded_hal::digital::InputPin;
use log::{debug, error};

use crate::config::FluidLevelConfig;
use crate::error::NodeError;
use crate::state::{FluidLevel, SharedTelemetryState};
use crate::task::{Flow, NodeTask, ShutdownSignal, TaskId, sleep_or_shutdown};

/// Reads the level switch and commits the result to shared state.
///
/// The indicator is not driven from here: it follows the committed value
/// through [`SharedTelemetryState::wait_fluid_level`], so the stored level
/// and the displayed level always come from the same read.
pub struct FluidLevelSampler<'a, P: InputPin> {
    input: P,
    state: &'a SharedTelemetryState,
    config: FluidLevelConfig,
}

impl<'a, P: InputPin> FluidLevelSampler<'a, P> {
    pub fn new(input: P, state: &'a SharedTelemetryState, config: FluidLevelConfig) -> Self {
        Self {
            input,
            state,
            config,
        }
    }

    /// Take exactly one digital read and commit it.
    pub fn sample_once(&mut self) -> Result<FluidLevel, NodeError> {
        let is_high = self.input.is_high().map_err(|e| {
            error!("Fluid level switch read failed: {:?}", e);
            NodeError::BusFault {
                sensor: "fluid level switch",
                operation: "digital read",
            }
        })?;

        let level = FluidLevel::from_input(is_high);
        debug!("Fluid level: {:?}", level);
        self.state.set_fluid_level(level);
        Ok(level)
    }
}

impl<P: InputPin> NodeTask for FluidLevelSampler<'_, P> {
    const ID: TaskId = TaskId::FluidLevel;

    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), NodeError> {
        loop {
            self.sample_once()?;
            if sleep_or_shutdown(shutdown, self.config.interval()).await == Flow::Shutdown {
                return Ok(());
            }
        }
    }
}
