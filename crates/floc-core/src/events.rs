//! Observability events published by node tasks
//!
//! Tasks never block on observability: events are pushed with `try_send` and
//! dropped when the channel is full. The supervisor drains the channel and
//! logs each event.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::debug;

use crate::error::{NodeError, RadioOperation};
use crate::task::TaskId;

/// Channel capacity for node events
/// Sized for a burst of failures from every task between two supervisor polls
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

pub type EventChannel = Channel<CriticalSectionRawMutex, NodeEvent, EVENT_CHANNEL_CAPACITY>;

/// Structural errors and lifecycle facts reported to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// The one-wire scan at startup found no probes
    NoProbesFound,
    /// A bounded climate retry policy ran out without a valid reading
    ClimateRetriesExhausted { attempts: u32 },
    /// Fewer than two pump readings were available for an uplink
    PartialReadingSet { available: u8, skipped: bool },
    /// A radio operation failed and the uplink cycle was discarded
    RadioIoFailure { operation: RadioOperation },
    /// The network join was confirmed
    Joined { polls: u32 },
    /// An uplink payload was handed to the radio
    UplinkSent { len: usize },
    /// Downlink bytes arrived in the receive window
    DownlinkReceived { len: usize },
    /// A task returned an error and will be restarted
    TaskFailed { task: TaskId, error: NodeError },
}

/// Publish an event without waiting for channel space.
pub fn publish(events: &EventChannel, event: NodeEvent) {
    if events.try_send(event).is_err() {
        debug!("Event channel full, dropping {:?}", event);
    }
}
