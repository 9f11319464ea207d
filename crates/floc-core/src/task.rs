//! Task plumbing: shutdown signals, cancellable sleeps and restart supervision

use core::future::Future;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use log::{error, info, warn};

use crate::error::NodeError;
use crate::events::{EventChannel, NodeEvent, publish};

/// Per-task shutdown request. Once observed it stays raised.
pub type ShutdownSignal = Signal<CriticalSectionRawMutex, ()>;

/// Identifies a long-running node task in logs and events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    AirPump,
    Ambient,
    FluidLevel,
    Indicator,
    Uplink,
    Supervisor,
}

impl TaskId {
    pub const fn name(self) -> &'static str {
        match self {
            Self::AirPump => "air-pump",
            Self::Ambient => "ambient",
            Self::FluidLevel => "fluid-level",
            Self::Indicator => "indicator",
            Self::Uplink => "uplink",
            Self::Supervisor => "supervisor",
        }
    }
}

/// Whether a task loop should keep going after a suspension point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Flow {
    Continue,
    Shutdown,
}

/// One shutdown signal per node task.
///
/// Nothing on the device ever raises these; they exist so the node can be
/// stopped cleanly in the simulator and under test.
pub struct NodeShutdown {
    pub air_pump: ShutdownSignal,
    pub ambient: ShutdownSignal,
    pub fluid_level: ShutdownSignal,
    pub indicator: ShutdownSignal,
    pub uplink: ShutdownSignal,
    pub supervisor: ShutdownSignal,
}

impl NodeShutdown {
    pub const fn new() -> Self {
        Self {
            air_pump: Signal::new(),
            ambient: Signal::new(),
            fluid_level: Signal::new(),
            indicator: Signal::new(),
            uplink: Signal::new(),
            supervisor: Signal::new(),
        }
    }

    pub fn for_task(&self, task: TaskId) -> &ShutdownSignal {
        match task {
            TaskId::AirPump => &self.air_pump,
            TaskId::Ambient => &self.ambient,
            TaskId::FluidLevel => &self.fluid_level,
            TaskId::Indicator => &self.indicator,
            TaskId::Uplink => &self.uplink,
            TaskId::Supervisor => &self.supervisor,
        }
    }

    /// Ask every task to stop at its next suspension point
    pub fn request_all(&self) {
        for task in [
            TaskId::AirPump,
            TaskId::Ambient,
            TaskId::FluidLevel,
            TaskId::Indicator,
            TaskId::Uplink,
            TaskId::Supervisor,
        ] {
            self.for_task(task).signal(());
        }
    }
}

impl Default for NodeShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a shutdown request, leaving it raised for any outer loop.
pub async fn wait_shutdown(shutdown: &ShutdownSignal) {
    shutdown.wait().await;
    shutdown.signal(());
}

/// Sleep for `duration` unless shutdown is requested first.
pub async fn sleep_or_shutdown(shutdown: &ShutdownSignal, duration: Duration) -> Flow {
    match select(Timer::after(duration), wait_shutdown(shutdown)).await {
        Either::First(()) => Flow::Continue,
        Either::Second(()) => Flow::Shutdown,
    }
}

/// A long-running task that can be restarted after a failure.
///
/// `run` returns `Ok(())` only when shutdown was requested. Any error ends
/// the current run and is handed to [`supervise`].
pub trait NodeTask {
    const ID: TaskId;

    fn run(&mut self, shutdown: &ShutdownSignal)
    -> impl Future<Output = Result<(), NodeError>>;
}

/// Run a task forever, restarting it after `restart_delay` whenever it fails.
pub async fn supervise<T: NodeTask>(
    task: &mut T,
    shutdown: &ShutdownSignal,
    events: &EventChannel,
    restart_delay: Duration,
) {
    let name = T::ID.name();
    info!("Starting {} task", name);

    loop {
        match task.run(shutdown).await {
            Ok(()) => {
                info!("{} task stopped", name);
                return;
            }
            Err(error) => {
                error!("{} task failed: {}", name, error);
                publish(
                    events,
                    NodeEvent::TaskFailed {
                        task: T::ID,
                        error,
                    },
                );
            }
        }

        if sleep_or_shutdown(shutdown, restart_delay).await == Flow::Shutdown {
            info!("{} task stopped", name);
            return;
        }
        warn!("Restarting {} task", name);
    }
}
