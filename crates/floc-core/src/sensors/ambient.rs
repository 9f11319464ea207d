//! Ambient temperature/humidity sampler
//!
//! DHT11-class sensors regularly return garbage. Invalid reads are retried
//! here and never reach shared state; only a valid sample is committed.

use log::{debug, info, warn};

use super::ClimateSensor;
use crate::config::AmbientConfig;
use crate::error::NodeError;
use crate::events::{EventChannel, NodeEvent, publish};
use crate::state::{ClimateReading, SharedTelemetryState};
use crate::task::{Flow, NodeTask, ShutdownSignal, TaskId, sleep_or_shutdown};

pub struct AmbientSampler<'a, S: ClimateSensor> {
    sensor: S,
    state: &'a SharedTelemetryState,
    events: &'a EventChannel,
    config: AmbientConfig,
    settled: bool,
}

impl<'a, S: ClimateSensor> AmbientSampler<'a, S> {
    pub fn new(
        sensor: S,
        state: &'a SharedTelemetryState,
        events: &'a EventChannel,
        config: AmbientConfig,
    ) -> Self {
        Self {
            sensor,
            state,
            events,
            config,
            settled: false,
        }
    }

    /// Read until a valid sample is committed or the retry policy runs out.
    pub async fn sample_once(&mut self, shutdown: &ShutdownSignal) -> Flow {
        let retry = self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts = attempts.saturating_add(1);
            match self.sensor.read().await {
                Ok(sample) if sample.is_valid() => {
                    let reading = ClimateReading::from_float(sample.temperature, sample.humidity);
                    debug!(
                        "Ambient: {} mC, {} m% after {} attempt(s)",
                        reading.temperature_milli_celsius, reading.humidity_milli_percent, attempts
                    );
                    self.state.set_climate(reading);
                    return Flow::Continue;
                }
                Ok(_) => debug!("Ambient read invalid (attempt {})", attempts),
                Err(e) => warn!("Ambient sensor read failed: {:?}", e),
            }

            if !retry.allows_retry(attempts) {
                warn!("No valid ambient reading after {} attempts", attempts);
                publish(self.events, NodeEvent::ClimateRetriesExhausted { attempts });
                return Flow::Continue;
            }

            if sleep_or_shutdown(shutdown, retry.delay_for(attempts)).await == Flow::Shutdown {
                return Flow::Shutdown;
            }
        }
    }
}

impl<S: ClimateSensor> NodeTask for AmbientSampler<'_, S> {
    const ID: TaskId = TaskId::Ambient;

    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), NodeError> {
        if !self.settled {
            info!("Waiting for the ambient sensor to settle");
            if sleep_or_shutdown(shutdown, self.config.settle_time()).await == Flow::Shutdown {
                return Ok(());
            }
            self.settled = true;
        }

        loop {
            if self.sample_once(shutdown).await == Flow::Shutdown {
                return Ok(());
            }
            if sleep_or_shutdown(shutdown, self.config.interval()).await == Flow::Shutdown {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, RetryPolicy};
    use crate::sensors::ClimateSample;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;
    use std::collections::VecDeque;

    const INVALID: ClimateSample = ClimateSample {
        temperature: 0.0,
        humidity: 0.0,
        valid: false,
    };

    /// Plays back a script, then repeats the last entry
    struct ScriptedSensor {
        script: VecDeque<Result<ClimateSample, ()>>,
        reads: u32,
    }

    impl ScriptedSensor {
        fn new(script: impl IntoIterator<Item = Result<ClimateSample, ()>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                reads: 0,
            }
        }
    }

    impl ClimateSensor for ScriptedSensor {
        type Error = ();

        async fn read(&mut self) -> Result<ClimateSample, ()> {
            self.reads += 1;
            if self.script.len() > 1 {
                self.script.pop_front().unwrap()
            } else {
                self.script[0]
            }
        }
    }

    fn config(retry: RetryPolicy) -> AmbientConfig {
        AmbientConfig {
            settle_ms: 1,
            interval_ms: 1,
            retry,
        }
    }

    #[test]
    fn test_invalid_reads_are_retried_before_commit() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let sensor = ScriptedSensor::new([
            Ok(INVALID),
            Err(()),
            Ok(ClimateSample {
                temperature: 21.5,
                humidity: 60.0,
                valid: true,
            }),
        ]);
        let mut sampler = AmbientSampler::new(sensor, &state, &events, config(RetryPolicy::forever(1)));

        assert_eq!(block_on(sampler.sample_once(&shutdown)), Flow::Continue);

        assert_eq!(sampler.sensor.reads, 3);
        assert_eq!(
            state.snapshot().climate,
            Some(ClimateReading {
                temperature_milli_celsius: 21_500,
                humidity_milli_percent: 60_000,
            })
        );
        assert!(events.try_receive().is_err());
    }

    #[test]
    fn test_bounded_retry_abandons_cycle() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let policy = RetryPolicy::bounded(3, Backoff::Fixed { delay_ms: 1 });
        let mut sampler =
            AmbientSampler::new(ScriptedSensor::new([Ok(INVALID)]), &state, &events, config(policy));

        assert_eq!(block_on(sampler.sample_once(&shutdown)), Flow::Continue);

        assert_eq!(sampler.sensor.reads, 3);
        assert_eq!(state.snapshot().climate, None);
        assert_eq!(
            events.try_receive(),
            Ok(NodeEvent::ClimateRetriesExhausted { attempts: 3 })
        );
    }

    #[test]
    fn test_task_keeps_running_after_exhausted_retries() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let policy = RetryPolicy::bounded(1, Backoff::Fixed { delay_ms: 1 });
        let mut sampler =
            AmbientSampler::new(ScriptedSensor::new([Ok(INVALID)]), &state, &events, config(policy));

        let (result, ()) = block_on(join(sampler.run(&shutdown), async {
            Timer::after_millis(30).await;
            shutdown.signal(());
        }));

        assert_eq!(result, Ok(()));
        assert!(sampler.sensor.reads > 1);
        assert!(sampler.settled);
    }
}
