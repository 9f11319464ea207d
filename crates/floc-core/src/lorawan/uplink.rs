//! Join-then-transmit loop against the radio
//!
//! After the join is confirmed the manager runs one cycle per uplink
//! interval: open a session, set the data rate, encode the current snapshot,
//! send it blocking, then look for a downlink without blocking. Radio
//! failures discard the cycle; the loop itself never stops on them.

use embassy_futures::select::{Either, select};
use log::{debug, error, info, warn};

use super::packet::{PUMP_SLOTS, encode};
use super::session::{JoinSession, JoinStatus, OtaaCredentials};
use super::{LoRaRadio, MAX_DOWNLINK_LEN, RadioSession};
use crate::config::UplinkConfig;
use crate::error::{NodeError, RadioOperation};
use crate::events::{EventChannel, NodeEvent, publish};
use crate::state::SharedTelemetryState;
use crate::task::{Flow, NodeTask, ShutdownSignal, TaskId, sleep_or_shutdown, wait_shutdown};

/// Result of a cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent {
        len: usize,
        downlink_len: usize,
        missing_pump_slots: u8,
    },
    /// Partial pump readings under the skip policy
    Skipped { available: u8 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UplinkStats {
    pub attempted: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

fn radio_error<E: core::fmt::Debug>(operation: RadioOperation, error: E) -> NodeError {
    error!("Radio {} failed: {:?}", operation, error);
    NodeError::Radio(operation)
}

pub struct UplinkManager<'a, R: LoRaRadio> {
    radio: R,
    session: JoinSession,
    state: &'a SharedTelemetryState,
    events: &'a EventChannel,
    config: UplinkConfig,
    stats: UplinkStats,
}

impl<'a, R: LoRaRadio> UplinkManager<'a, R> {
    pub fn new(
        radio: R,
        credentials: OtaaCredentials,
        state: &'a SharedTelemetryState,
        events: &'a EventChannel,
        config: UplinkConfig,
    ) -> Self {
        Self {
            radio,
            session: JoinSession::new(credentials),
            state,
            events,
            config,
            stats: UplinkStats::default(),
        }
    }

    pub fn join_status(&self) -> JoinStatus {
        self.session.status()
    }

    pub fn stats(&self) -> UplinkStats {
        self.stats
    }

    /// Issue the OTAA join and poll until the radio reports it joined.
    ///
    /// Does nothing once joined: the joined status is never re-checked.
    pub async fn join(&mut self, shutdown: &ShutdownSignal) -> Result<Flow, NodeError> {
        if self.session.is_joined() {
            return Ok(Flow::Continue);
        }

        self.session.begin()?;
        info!("Joining LoRaWAN network");
        match select(
            self.radio.join(self.session.credentials()),
            wait_shutdown(shutdown),
        )
        .await
        {
            Either::First(result) => {
                if let Err(e) = result {
                    publish(
                        self.events,
                        NodeEvent::RadioIoFailure {
                            operation: RadioOperation::Join,
                        },
                    );
                    return Err(radio_error(RadioOperation::Join, e));
                }
            }
            Either::Second(()) => return Ok(Flow::Shutdown),
        }

        let policy = self.config.join_poll;
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if self.radio.has_joined() {
                break;
            }
            if !policy.allows_retry(polls) {
                warn!("Join not confirmed after {} polls", polls);
                return Err(NodeError::JoinTimedOut { attempts: polls });
            }
            debug!("Join pending (poll {})", polls);
            if sleep_or_shutdown(shutdown, policy.delay_for(polls)).await == Flow::Shutdown {
                return Ok(Flow::Shutdown);
            }
        }

        self.session.mark_joined()?;
        info!("Joined LoRaWAN network after {} poll(s)", polls);
        publish(self.events, NodeEvent::Joined { polls });
        Ok(Flow::Continue)
    }

    /// One open/configure/encode/send/receive exchange.
    pub async fn uplink_cycle(&mut self) -> Result<CycleOutcome, NodeError> {
        let mut session = self
            .radio
            .open()
            .map_err(|e| radio_error(RadioOperation::Open, e))?;
        session
            .set_data_rate(self.config.data_rate)
            .map_err(|e| radio_error(RadioOperation::Configure, e))?;

        let snapshot = self.state.snapshot();
        let packet = match encode(&snapshot, self.config.format, self.config.partial_policy) {
            Ok(packet) => packet,
            Err(NodeError::PartialReadingSet { available }) => {
                return Ok(CycleOutcome::Skipped { available });
            }
            Err(e) => return Err(e),
        };

        session
            .set_blocking(true)
            .map_err(|e| radio_error(RadioOperation::Configure, e))?;
        session
            .send(packet.as_bytes())
            .await
            .map_err(|e| radio_error(RadioOperation::Send, e))?;
        debug!("Sent {:02X?}", packet.as_bytes());

        let mut downlink = [0u8; MAX_DOWNLINK_LEN];
        let received = match session.set_blocking(false) {
            Ok(()) => session.recv(&mut downlink).await,
            Err(e) => Err(e),
        };
        let downlink_len = match received {
            Ok(len) => len.min(MAX_DOWNLINK_LEN),
            Err(e) => {
                warn!("Receive after uplink failed: {:?}", e);
                publish(
                    self.events,
                    NodeEvent::RadioIoFailure {
                        operation: RadioOperation::Receive,
                    },
                );
                0
            }
        };
        if downlink_len > 0 {
            info!("Downlink: {:02X?}", &downlink[..downlink_len]);
        }

        Ok(CycleOutcome::Sent {
            len: packet.len(),
            downlink_len,
            missing_pump_slots: packet.missing_pump_slots(),
        })
    }

    fn record_cycle(&mut self, outcome: Result<CycleOutcome, NodeError>) {
        self.stats.attempted = self.stats.attempted.wrapping_add(1);
        match outcome {
            Ok(CycleOutcome::Sent {
                len,
                downlink_len,
                missing_pump_slots,
            }) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                info!("Uplink sent ({} bytes)", len);
                publish(self.events, NodeEvent::UplinkSent { len });
                if downlink_len > 0 {
                    publish(self.events, NodeEvent::DownlinkReceived { len: downlink_len });
                }
                if missing_pump_slots > 0 {
                    publish(
                        self.events,
                        NodeEvent::PartialReadingSet {
                            available: PUMP_SLOTS as u8 - missing_pump_slots,
                            skipped: false,
                        },
                    );
                }
            }
            Ok(CycleOutcome::Skipped { available }) => {
                self.stats.skipped = self.stats.skipped.wrapping_add(1);
                warn!(
                    "Only {} pump reading(s) available, skipping uplink",
                    available
                );
                publish(
                    self.events,
                    NodeEvent::PartialReadingSet {
                        available,
                        skipped: true,
                    },
                );
            }
            Err(NodeError::Radio(operation)) => {
                self.stats.failed = self.stats.failed.wrapping_add(1);
                warn!("Uplink cycle discarded: radio {} failed", operation);
                publish(self.events, NodeEvent::RadioIoFailure { operation });
            }
            Err(e) => {
                self.stats.failed = self.stats.failed.wrapping_add(1);
                error!("Uplink cycle discarded: {}", e);
            }
        }
    }
}

impl<R: LoRaRadio> NodeTask for UplinkManager<'_, R> {
    const ID: TaskId = TaskId::Uplink;

    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), NodeError> {
        if self.join(shutdown).await? == Flow::Shutdown {
            return Ok(());
        }

        loop {
            let outcome = match select(self.uplink_cycle(), wait_shutdown(shutdown)).await {
                Either::First(outcome) => outcome,
                Either::Second(()) => return Ok(()),
            };
            self.record_cycle(outcome);

            if sleep_or_shutdown(shutdown, self.config.interval()).await == Flow::Shutdown {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartialReadingPolicy, UplinkFormat};
    use crate::retry::{Backoff, RetryPolicy};
    use crate::state::{
        ClimateReading, DeciCelsius, FluidLevel, ProbeAddress, ProbeValue, TemperatureReading,
    };
    use core::cell::Cell;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;
    use std::vec::Vec;

    #[derive(Debug, PartialEq)]
    enum MockError {
        JoinRejected,
        SendFailed,
        RecvFailed,
    }

    /// Radio that joins after `join_after` polls of `has_joined`
    #[derive(Default)]
    struct MockRadio {
        join_after: u32,
        join_fails: bool,
        polls: Cell<u32>,
        /// Report joined only until this many polls, 0 for forever
        forget_join_after: u32,
        /// Fail every send whose 1-based index is listed
        failing_sends: Vec<usize>,
        recv_fails: bool,
        downlink: Vec<u8>,
        send_calls: usize,
        sent: Vec<Vec<u8>>,
        data_rates: Vec<u8>,
    }

    struct MockSession<'s> {
        radio: &'s mut MockRadio,
        blocking: bool,
    }

    impl LoRaRadio for MockRadio {
        type Error = MockError;
        type Session<'s>
            = MockSession<'s>
        where
            Self: 's;

        async fn join(&mut self, _credentials: &OtaaCredentials) -> Result<(), MockError> {
            if self.join_fails {
                Err(MockError::JoinRejected)
            } else {
                Ok(())
            }
        }

        fn has_joined(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            let forgotten = self.forget_join_after > 0 && polls > self.forget_join_after;
            polls >= self.join_after && !forgotten
        }

        fn open(&mut self) -> Result<MockSession<'_>, MockError> {
            Ok(MockSession {
                radio: self,
                blocking: false,
            })
        }
    }

    impl RadioSession for MockSession<'_> {
        type Error = MockError;

        fn set_data_rate(&mut self, data_rate: u8) -> Result<(), MockError> {
            self.radio.data_rates.push(data_rate);
            Ok(())
        }

        fn set_blocking(&mut self, blocking: bool) -> Result<(), MockError> {
            self.blocking = blocking;
            Ok(())
        }

        async fn send(&mut self, payload: &[u8]) -> Result<(), MockError> {
            assert!(self.blocking);
            self.radio.send_calls += 1;
            if self.radio.failing_sends.contains(&self.radio.send_calls) {
                return Err(MockError::SendFailed);
            }
            self.radio.sent.push(payload.to_vec());
            Ok(())
        }

        async fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, MockError> {
            assert!(!self.blocking);
            if self.radio.recv_fails {
                return Err(MockError::RecvFailed);
            }
            let len = self.radio.downlink.len().min(buffer.len());
            buffer[..len].copy_from_slice(&self.radio.downlink[..len]);
            Ok(len)
        }
    }

    fn credentials() -> OtaaCredentials {
        OtaaCredentials {
            dev_eui: [1; 8],
            app_eui: [0; 8],
            app_key: [2; 16],
        }
    }

    fn fast_config() -> UplinkConfig {
        UplinkConfig {
            interval_ms: 5,
            join_poll: RetryPolicy::forever(1),
            ..UplinkConfig::default()
        }
    }

    fn populated_state() -> SharedTelemetryState {
        let state = SharedTelemetryState::new();
        state.set_fluid_level(FluidLevel::Ok);
        state.set_climate(ClimateReading::from_float(21.5, 60.0));
        for (probe, deci) in [(1, 183), (2, 199)] {
            state.set_pump_temp(TemperatureReading {
                probe: ProbeAddress(probe),
                value: ProbeValue::Measured(DeciCelsius(deci)),
            });
        }
        state
    }

    fn drain(events: &EventChannel) -> Vec<NodeEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_receive() {
            drained.push(event);
        }
        drained
    }

    #[test]
    fn test_join_polls_until_confirmed() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let radio = MockRadio {
            join_after: 3,
            ..MockRadio::default()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, fast_config());

        assert_eq!(block_on(manager.join(&shutdown)), Ok(Flow::Continue));
        assert_eq!(manager.join_status(), JoinStatus::Joined);
        assert_eq!(drain(&events), [NodeEvent::Joined { polls: 3 }]);

        // Already joined: no further polling
        assert_eq!(block_on(manager.join(&shutdown)), Ok(Flow::Continue));
        assert_eq!(manager.radio.polls.get(), 3);
    }

    #[test]
    fn test_bounded_join_poll_times_out() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let radio = MockRadio {
            join_after: u32::MAX,
            ..MockRadio::default()
        };
        let config = UplinkConfig {
            join_poll: RetryPolicy::bounded(4, Backoff::Fixed { delay_ms: 1 }),
            ..fast_config()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, config);

        assert_eq!(
            block_on(manager.join(&shutdown)),
            Err(NodeError::JoinTimedOut { attempts: 4 })
        );
        // A restarted task may re-issue the join
        assert_eq!(manager.join_status(), JoinStatus::Joining);
    }

    #[test]
    fn test_rejected_join_is_radio_failure() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let radio = MockRadio {
            join_fails: true,
            ..MockRadio::default()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, fast_config());

        assert_eq!(
            block_on(manager.join(&shutdown)),
            Err(NodeError::Radio(RadioOperation::Join))
        );
        assert_eq!(
            drain(&events),
            [NodeEvent::RadioIoFailure {
                operation: RadioOperation::Join
            }]
        );
    }

    #[test]
    fn test_cycle_sends_snapshot_and_reads_downlink() {
        let state = populated_state();
        let events = EventChannel::new();
        let radio = MockRadio {
            downlink: std::vec![0xCA, 0xFE],
            ..MockRadio::default()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, fast_config());

        let outcome = block_on(manager.uplink_cycle());

        assert_eq!(
            outcome,
            Ok(CycleOutcome::Sent {
                len: 5,
                downlink_len: 2,
                missing_pump_slots: 0,
            })
        );
        assert_eq!(manager.radio.data_rates, [5]);
        assert_eq!(manager.radio.sent, [std::vec![1u8, 21, 60, 18, 19]]);
    }

    #[test]
    fn test_receive_failure_still_counts_as_sent() {
        let state = populated_state();
        let events = EventChannel::new();
        let radio = MockRadio {
            recv_fails: true,
            ..MockRadio::default()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, fast_config());

        let outcome = block_on(manager.uplink_cycle());
        manager.record_cycle(outcome);

        assert_eq!(manager.stats().sent, 1);
        assert_eq!(
            drain(&events),
            [
                NodeEvent::RadioIoFailure {
                    operation: RadioOperation::Receive
                },
                NodeEvent::UplinkSent { len: 5 },
            ]
        );
    }

    #[test]
    fn test_send_failure_does_not_stop_task() {
        let state = populated_state();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let radio = MockRadio {
            failing_sends: std::vec![1, 3],
            // Joined status flips back after the join; it must not be re-checked
            forget_join_after: 1,
            ..MockRadio::default()
        };
        let mut manager = UplinkManager::new(radio, credentials(), &state, &events, fast_config());

        let (result, ()) = block_on(join(manager.run(&shutdown), async {
            Timer::after_millis(60).await;
            shutdown.signal(());
        }));

        assert_eq!(result, Ok(()));
        let stats = manager.stats();
        assert_eq!(stats.failed, 2);
        assert!(stats.sent >= 2);
        assert_eq!(stats.attempted, stats.sent + stats.failed);
        assert_eq!(manager.radio.polls.get(), 1);
        assert_eq!(manager.join_status(), JoinStatus::Joined);
    }

    #[test]
    fn test_skip_policy_sends_nothing() {
        let state = SharedTelemetryState::new();
        state.set_fluid_level(FluidLevel::Low);
        let events = EventChannel::new();
        let config = UplinkConfig {
            partial_policy: PartialReadingPolicy::SkipCycle,
            format: UplinkFormat::Legacy,
            ..fast_config()
        };
        let mut manager =
            UplinkManager::new(MockRadio::default(), credentials(), &state, &events, config);

        let outcome = block_on(manager.uplink_cycle());
        manager.record_cycle(outcome);

        assert!(manager.radio.sent.is_empty());
        assert_eq!(manager.stats().skipped, 1);
        assert_eq!(
            drain(&events),
            [NodeEvent::PartialReadingSet {
                available: 0,
                skipped: true
            }]
        );
    }
}
