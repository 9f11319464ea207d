//! Desktop simulator for the floc-node telemetry node.
//!
//! Runs the complete node from floc-core on the embassy std executor with
//! simulated probes, ambient sensor, level switch, LED and LoRaWAN radio.
//! All intervals are compressed so a full join/uplink cycle takes seconds.
//!
//! ```text
//! RUST_LOG=debug cargo run -p floc-simulator -- 60
//! ```
//!
//! The optional argument is the run time in seconds. The tank level drops
//! and is refilled periodically so the indicator can be watched switching.

mod drivers;

use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use log::{error, info};
use static_cell::StaticCell;

use floc_core::config::{
    AirPumpConfig, AmbientConfig, CredentialsHex, FluidLevelConfig, SupervisorConfig, UplinkConfig,
};
use floc_core::retry::{Backoff, RetryPolicy};
use floc_core::{
    EventChannel, Node, NodeConfig, NodeContext, NodeDrivers, NodeShutdown, SharedTelemetryState,
};

use drivers::{SimClimate, SimLed, SimLevelSwitch, SimOneWire, SimRadio, TankLevel};

/// Default simulated run time
const DEFAULT_RUN_TIME: Duration = Duration::from_secs(45);

/// Time between tank level flips
const TANK_FLIP_INTERVAL: Duration = Duration::from_secs(12);

static STATE: StaticCell<SharedTelemetryState> = StaticCell::new();
static EVENTS: StaticCell<EventChannel> = StaticCell::new();
static SHUTDOWN: StaticCell<NodeShutdown> = StaticCell::new();
static TANK: TankLevel = TankLevel::new(true);

fn simulator_config() -> NodeConfig<'static> {
    NodeConfig {
        credentials: CredentialsHex {
            dev_eui: env!("LORA_DEV_EUI"),
            app_eui: env!("LORA_APP_EUI"),
            app_key: env!("LORA_APP_KEY"),
        },
        air_pump: AirPumpConfig {
            conversion_ms: 250,
            min_cycle_ms: 1000,
            ..AirPumpConfig::default()
        },
        ambient: AmbientConfig {
            settle_ms: 500,
            interval_ms: 2000,
            retry: RetryPolicy::forever(200),
        },
        fluid_level: FluidLevelConfig { interval_ms: 250 },
        uplink: UplinkConfig {
            interval_ms: 5000,
            join_poll: RetryPolicy::bounded(
                10,
                Backoff::Exponential {
                    initial_ms: 250,
                    max_ms: 2000,
                },
            ),
            ..UplinkConfig::default()
        },
        supervisor: SupervisorConfig {
            settle_ms: 1500,
            log_interval_ms: 10_000,
            restart_delay_ms: 500,
        },
        ..NodeConfig::default()
    }
}

/// Drain and refill the tank forever
async fn tank_scenario() {
    loop {
        Timer::after(TANK_FLIP_INTERVAL).await;
        let high = !TANK.is_high();
        info!("Scenario: tank {}", if high { "refilled" } else { "running low" });
        TANK.set(high);
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let run_time = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RUN_TIME);

    let state: &'static SharedTelemetryState = STATE.init(SharedTelemetryState::new());
    let events: &'static EventChannel = EVENTS.init(EventChannel::new());
    let shutdown: &'static NodeShutdown = SHUTDOWN.init(NodeShutdown::new());
    let ctx = NodeContext {
        state,
        events,
        shutdown,
    };

    let config = simulator_config();
    let drivers = NodeDrivers {
        bus: SimOneWire::new(),
        climate: SimClimate::new(),
        fluid_input: SimLevelSwitch::new(&TANK),
        indicator: SimLed,
        radio: SimRadio::new(config.region, 3),
    };

    let node = match Node::new(ctx, &config, drivers) {
        Ok(node) => node,
        Err(e) => {
            error!("Cannot start node: {}", e);
            std::process::exit(1);
        }
    };

    info!("Simulating {} s of node operation", run_time.as_secs());
    let scenario = async {
        if let Either::Second(()) = select(tank_scenario(), Timer::after(run_time)).await {
            info!("Run time elapsed, requesting shutdown");
        }
        shutdown.request_all();
    };
    let (report, ()) = join(node.run(), scenario).await;

    info!(
        "Uplinks: {} attempted, {} sent, {} failed, {} skipped",
        report.uplink.attempted, report.uplink.sent, report.uplink.failed, report.uplink.skipped
    );
    info!(
        "Supervisor saw {} event(s), {} task failure(s)",
        report.events_seen, report.task_failures
    );

    // The std executor never returns on its own
    std::process::exit(0);
}
