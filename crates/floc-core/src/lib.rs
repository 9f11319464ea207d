//! Hardware-independent core library for floc-node
//!
//! This crate contains all platform-agnostic logic for the flocculation tank
//! telemetry node: the shared telemetry state, the sensor samplers, the fluid
//! level indicator, the LoRaWAN join/uplink state machine, and the task
//! supervisor that ties them together.
//!
//! Hardware is reached only through the port traits in [`sensors`],
//! [`indicator`] and [`lorawan`], so the whole node can run on an embedded
//! target, in the desktop simulator, or under test with scripted drivers.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod events;
pub mod indicator;
pub mod lorawan;
pub mod retry;
pub mod sensors;
pub mod state;
pub mod supervisor;
pub mod task;

pub use config::NodeConfig;
pub use error::NodeError;
pub use events::{EventChannel, NodeEvent};
pub use state::{SharedTelemetryState, TelemetrySnapshot};
pub use supervisor::{Node, NodeContext, NodeDrivers, NodeReport};
pub use task::{NodeShutdown, ShutdownSignal};
