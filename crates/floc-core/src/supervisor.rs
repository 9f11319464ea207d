//! Node assembly and supervision
//!
//! [`Node::run`] drives every component future concurrently:
//!
//! - the three samplers and the indicator observer start immediately
//! - the uplink task starts after a settle period so the first packet
//!   carries real readings
//! - the [`Supervisor`] logs each [`NodeEvent`] and the current snapshot
//!   every log interval
//!
//! Each task runs under [`supervise`], which restarts it after an error.
//! `run` returns once every task has observed its shutdown signal.

use embassy_futures::join::{join3, join4};
use embassy_futures::select::{Either3, select3};
use embassy_time::Ticker;
use embedded_hal::digital::InputPin;
use log::{error, info, warn};

use crate::config::{NodeConfig, SupervisorConfig};
use crate::error::NodeError;
use crate::events::{EventChannel, NodeEvent};
use crate::indicator::{Indicator, IndicatorTask};
use crate::lorawan::{LoRaRadio, OtaaCredentials, UplinkManager, UplinkStats};
use crate::sensors::{AirPumpSampler, AmbientSampler, ClimateSensor, FluidLevelSampler, OneWireBus};
use crate::state::SharedTelemetryState;
use crate::task::{Flow, NodeShutdown, ShutdownSignal, sleep_or_shutdown, supervise, wait_shutdown};

/// Shared resources every task borrows. Usually all `'static`.
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub state: &'a SharedTelemetryState,
    pub events: &'a EventChannel,
    pub shutdown: &'a NodeShutdown,
}

/// Hardware handed to the node, one driver per port
pub struct NodeDrivers<B, C, P, I, R> {
    pub bus: B,
    pub climate: C,
    pub fluid_input: P,
    pub indicator: I,
    pub radio: R,
}

/// Counters collected while the node ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeReport {
    pub uplink: UplinkStats,
    pub events_seen: u32,
    pub task_failures: u32,
}

fn log_event(event: &NodeEvent) {
    match *event {
        NodeEvent::NoProbesFound => warn!("Event: no air-pump probes on the bus"),
        NodeEvent::ClimateRetriesExhausted { attempts } => {
            warn!("Event: ambient sensor gave no valid reading in {} attempts", attempts)
        }
        NodeEvent::PartialReadingSet { available, skipped } => warn!(
            "Event: {} of 2 pump readings available, uplink {}",
            available,
            if skipped { "skipped" } else { "sent with gaps" }
        ),
        NodeEvent::RadioIoFailure { operation } => warn!("Event: radio {} failed", operation),
        NodeEvent::Joined { polls } => info!("Event: joined network after {} poll(s)", polls),
        NodeEvent::UplinkSent { len } => info!("Event: uplink sent, {} bytes", len),
        NodeEvent::DownlinkReceived { len } => info!("Event: downlink received, {} bytes", len),
        NodeEvent::TaskFailed { task, error } => {
            error!("Event: {} task failed: {}", task.name(), error)
        }
    }
}

/// Observation loop: event log and periodic state log
pub struct Supervisor<'a> {
    state: &'a SharedTelemetryState,
    events: &'a EventChannel,
    config: SupervisorConfig,
    events_seen: u32,
    task_failures: u32,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        state: &'a SharedTelemetryState,
        events: &'a EventChannel,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            state,
            events,
            config,
            events_seen: 0,
            task_failures: 0,
        }
    }

    fn handle(&mut self, event: NodeEvent) {
        self.events_seen = self.events_seen.wrapping_add(1);
        if matches!(event, NodeEvent::TaskFailed { .. }) {
            self.task_failures = self.task_failures.wrapping_add(1);
        }
        log_event(&event);
    }

    pub async fn observe(&mut self, shutdown: &ShutdownSignal) {
        let mut ticker = Ticker::every(self.config.log_interval());
        loop {
            match select3(self.events.receive(), ticker.next(), wait_shutdown(shutdown)).await {
                Either3::First(event) => self.handle(event),
                Either3::Second(()) => info!("{}", self.state.snapshot()),
                Either3::Third(()) => break,
            }
        }

        while let Ok(event) = self.events.try_receive() {
            self.handle(event);
        }
        info!("Final state: {}", self.state.snapshot());
    }
}

pub struct Node<'a, B, C, P, I, R>
where
    B: OneWireBus,
    C: ClimateSensor,
    P: InputPin,
    I: Indicator,
    R: LoRaRadio,
{
    ctx: NodeContext<'a>,
    config: SupervisorConfig,
    air_pump: AirPumpSampler<'a, B>,
    ambient: AmbientSampler<'a, C>,
    fluid_level: FluidLevelSampler<'a, P>,
    indicator: IndicatorTask<'a, I>,
    uplink: UplinkManager<'a, R>,
    supervisor: Supervisor<'a>,
}

impl<'a, B, C, P, I, R> Node<'a, B, C, P, I, R>
where
    B: OneWireBus,
    C: ClimateSensor,
    P: InputPin,
    I: Indicator,
    R: LoRaRadio,
{
    /// Wire every component. Fails only on malformed credentials.
    pub fn new(
        ctx: NodeContext<'a>,
        config: &NodeConfig<'_>,
        drivers: NodeDrivers<B, C, P, I, R>,
    ) -> Result<Self, NodeError> {
        let credentials = OtaaCredentials::parse(&config.credentials)?;
        info!("Node configured for {:?} with {:?}", config.region, credentials);

        Ok(Self {
            ctx,
            config: config.supervisor,
            air_pump: AirPumpSampler::new(drivers.bus, ctx.state, ctx.events, config.air_pump),
            ambient: AmbientSampler::new(drivers.climate, ctx.state, ctx.events, config.ambient),
            fluid_level: FluidLevelSampler::new(drivers.fluid_input, ctx.state, config.fluid_level),
            indicator: IndicatorTask::new(drivers.indicator, ctx.state),
            uplink: UplinkManager::new(
                drivers.radio,
                credentials,
                ctx.state,
                ctx.events,
                config.uplink,
            ),
            supervisor: Supervisor::new(ctx.state, ctx.events, config.supervisor),
        })
    }

    /// Run until every task has been asked to shut down.
    pub async fn run(self) -> NodeReport {
        let Self {
            ctx,
            config,
            mut air_pump,
            mut ambient,
            mut fluid_level,
            mut indicator,
            mut uplink,
            mut supervisor,
        } = self;
        let shutdown = ctx.shutdown;
        let restart = config.restart_delay();

        let samplers = join4(
            supervise(&mut air_pump, &shutdown.air_pump, ctx.events, restart),
            supervise(&mut ambient, &shutdown.ambient, ctx.events, restart),
            supervise(&mut fluid_level, &shutdown.fluid_level, ctx.events, restart),
            supervise(&mut indicator, &shutdown.indicator, ctx.events, restart),
        );
        let uplink_task = async {
            info!("Uplink starts in {} ms", config.settle_time().as_millis());
            if sleep_or_shutdown(&shutdown.uplink, config.settle_time()).await == Flow::Continue {
                supervise(&mut uplink, &shutdown.uplink, ctx.events, restart).await;
            }
        };

        join3(samplers, uplink_task, supervisor.observe(&shutdown.supervisor)).await;

        info!("Node stopped");
        NodeReport {
            uplink: uplink.stats(),
            events_seen: supervisor.events_seen,
            task_failures: supervisor.task_failures,
        }
    }
}
