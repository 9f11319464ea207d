//! Air-pump temperature sampler
//!
//! Polls every probe found on the one-wire bus, one after the other. Each
//! probe needs its own conversion wait, so a pass over all probes takes
//! roughly `probes x conversion_time`.

use embassy_futures::yield_now;
use embassy_time::Instant;
use heapless::Vec;
use log::{debug, error, info, warn};

use super::OneWireBus;
use crate::config::AirPumpConfig;
use crate::error::NodeError;
use crate::events::{EventChannel, NodeEvent, publish};
use crate::state::{
    DeciCelsius, MAX_PUMP_PROBES, ProbeAddress, ProbeValue, SharedTelemetryState,
    TemperatureReading,
};
use crate::task::{Flow, NodeTask, ShutdownSignal, TaskId, sleep_or_shutdown, wait_shutdown};

/// Map a raw probe value to what gets stored in shared state.
///
/// A probe that is physically disconnected keeps answering with a fixed
/// sentinel value. Note that the default sentinel (-0.1 C) is also a
/// plausible real reading near freezing, so such readings are lost too.
pub fn classify(raw_celsius: f32, sentinel: Option<DeciCelsius>) -> ProbeValue {
    let value = DeciCelsius::from_celsius(raw_celsius);
    if sentinel == Some(value) {
        ProbeValue::Unavailable
    } else {
        ProbeValue::Measured(value)
    }
}

pub struct AirPumpSampler<'a, B: OneWireBus> {
    bus: B,
    state: &'a SharedTelemetryState,
    events: &'a EventChannel,
    config: AirPumpConfig,
    /// `None` until the bus has been scanned successfully
    probes: Option<Vec<ProbeAddress, MAX_PUMP_PROBES>>,
}

impl<'a, B: OneWireBus> AirPumpSampler<'a, B> {
    pub fn new(
        bus: B,
        state: &'a SharedTelemetryState,
        events: &'a EventChannel,
        config: AirPumpConfig,
    ) -> Self {
        Self {
            bus,
            state,
            events,
            config,
            probes: None,
        }
    }

    /// Scan the bus once and register the probes found.
    ///
    /// Later calls return the cached result. A failed scan is not cached, so
    /// the next call scans again.
    pub async fn discover(&mut self) -> Result<&[ProbeAddress], NodeError> {
        if self.probes.is_none() {
            let found = self.bus.scan().await.map_err(|e| {
                error!("One-wire scan failed: {:?}", e);
                NodeError::BusFault {
                    sensor: "one-wire bus",
                    operation: "scan",
                }
            })?;

            info!("Found {} air-pump probe(s)", found.len());
            for probe in &found {
                debug!("  probe {}", probe);
            }
            self.state.register_probes(&found);
            self.probes = Some(found);
        }

        Ok(self.probes.as_deref().unwrap_or(&[]))
    }

    /// One full pass over every discovered probe.
    pub async fn sample_once(&mut self, shutdown: &ShutdownSignal) -> Result<Flow, NodeError> {
        let started = Instant::now();
        self.discover().await?;
        let probes = self.probes.clone().unwrap_or_default();

        for probe in probes {
            let value = match self.measure(probe, shutdown).await {
                Some(value) => value,
                None => return Ok(Flow::Shutdown),
            };
            self.state.set_pump_temp(TemperatureReading { probe, value });
        }

        let min_cycle = self.config.min_cycle();
        let elapsed = started.elapsed();
        if elapsed < min_cycle {
            return Ok(sleep_or_shutdown(shutdown, min_cycle - elapsed).await);
        }

        // Mock buses and zero conversion times never suspend
        yield_now().await;
        Ok(Flow::Continue)
    }

    /// Convert and read one probe. `None` means shutdown was requested.
    async fn measure(
        &mut self,
        probe: ProbeAddress,
        shutdown: &ShutdownSignal,
    ) -> Option<ProbeValue> {
        if let Err(e) = self.bus.start_conversion(probe).await {
            warn!("Probe {}: conversion start failed: {:?}", probe, e);
            return Some(ProbeValue::Unavailable);
        }

        if sleep_or_shutdown(shutdown, self.config.conversion_time()).await == Flow::Shutdown {
            return None;
        }

        let sentinel = self.config.disconnected_sentinel_deci.map(DeciCelsius);
        match self.bus.read_temperature(probe).await {
            Ok(raw) => {
                let value = classify(raw, sentinel);
                if value == ProbeValue::Unavailable {
                    debug!("Probe {} reports disconnected", probe);
                }
                Some(value)
            }
            Err(e) => {
                warn!("Probe {}: read failed: {:?}", probe, e);
                Some(ProbeValue::Unavailable)
            }
        }
    }
}

impl<B: OneWireBus> NodeTask for AirPumpSampler<'_, B> {
    const ID: TaskId = TaskId::AirPump;

    async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<(), NodeError> {
        if self.discover().await?.is_empty() {
            error!("No air-pump probes found, pump temperatures stay unavailable");
            publish(self.events, NodeEvent::NoProbesFound);
            wait_shutdown(shutdown).await;
            return Ok(());
        }

        loop {
            if self.sample_once(shutdown).await? == Flow::Shutdown {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    const PROBE_A: ProbeAddress = ProbeAddress(0x2800_0000_0000_00A1);
    const PROBE_B: ProbeAddress = ProbeAddress(0x2800_0000_0000_00B2);

    #[derive(Debug)]
    struct BusError;

    struct ScriptedBus {
        probes: Vec<ProbeAddress, MAX_PUMP_PROBES>,
        scan_fails: u32,
        scans: u32,
        read: fn(ProbeAddress) -> Result<f32, BusError>,
    }

    impl ScriptedBus {
        fn new(probes: &[ProbeAddress], read: fn(ProbeAddress) -> Result<f32, BusError>) -> Self {
            Self {
                probes: probes.iter().copied().collect(),
                scan_fails: 0,
                scans: 0,
                read,
            }
        }
    }

    impl OneWireBus for ScriptedBus {
        type Error = BusError;

        async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PUMP_PROBES>, BusError> {
            self.scans += 1;
            if self.scans <= self.scan_fails {
                return Err(BusError);
            }
            Ok(self.probes.clone())
        }

        async fn start_conversion(&mut self, probe: ProbeAddress) -> Result<(), BusError> {
            if probe.0 == 0 { Err(BusError) } else { Ok(()) }
        }

        async fn read_temperature(&mut self, probe: ProbeAddress) -> Result<f32, BusError> {
            (self.read)(probe)
        }
    }

    fn fast_config() -> AirPumpConfig {
        AirPumpConfig {
            conversion_ms: 1,
            ..AirPumpConfig::default()
        }
    }

    #[test]
    fn test_sentinel_maps_to_unavailable() {
        let sentinel = Some(DeciCelsius(-1));
        assert_eq!(classify(-0.1, sentinel), ProbeValue::Unavailable);
        assert_eq!(
            classify(18.34, sentinel),
            ProbeValue::Measured(DeciCelsius(183))
        );
        assert_eq!(
            classify(-0.1, None),
            ProbeValue::Measured(DeciCelsius(-1))
        );
    }

    #[test]
    fn test_pass_stores_reading_per_probe() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let bus = ScriptedBus::new(&[PROBE_A, PROBE_B], |probe| {
            if probe == PROBE_A { Ok(18.3) } else { Ok(-0.1) }
        });
        let mut sampler = AirPumpSampler::new(bus, &state, &events, fast_config());

        let flow = block_on(sampler.sample_once(&shutdown)).unwrap();
        assert_eq!(flow, Flow::Continue);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.pumps[0].probe, PROBE_A);
        assert_eq!(
            snapshot.pumps[0].value,
            ProbeValue::Measured(DeciCelsius(183))
        );
        assert_eq!(snapshot.pumps[1].value, ProbeValue::Unavailable);
    }

    #[test]
    fn test_bus_errors_become_unavailable() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        // Probe 0 fails to start a conversion, PROBE_B fails the read
        let bus = ScriptedBus::new(&[ProbeAddress(0), PROBE_B], |_| Err(BusError));
        let mut sampler = AirPumpSampler::new(bus, &state, &events, fast_config());

        let flow = block_on(sampler.sample_once(&shutdown)).unwrap();
        assert_eq!(flow, Flow::Continue);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.pumps.len(), 2);
        assert!(snapshot.pump_values().all(|value| value.is_none()));
    }

    #[test]
    fn test_failed_scan_is_retried_on_restart() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let mut bus = ScriptedBus::new(&[PROBE_A], |_| Ok(20.0));
        bus.scan_fails = 1;
        let mut sampler = AirPumpSampler::new(bus, &state, &events, fast_config());

        let error = block_on(sampler.run(&shutdown)).unwrap_err();
        assert!(matches!(error, NodeError::BusFault { operation: "scan", .. }));

        shutdown.signal(());
        block_on(sampler.run(&shutdown)).unwrap();
        assert_eq!(sampler.bus.scans, 2);
        assert_eq!(state.snapshot().pumps.len(), 1);
    }

    #[test]
    fn test_no_probes_parks_until_shutdown() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        shutdown.signal(());
        let bus = ScriptedBus::new(&[], |_| Ok(20.0));
        let mut sampler = AirPumpSampler::new(bus, &state, &events, fast_config());

        block_on(sampler.run(&shutdown)).unwrap();

        assert_eq!(events.try_receive(), Ok(NodeEvent::NoProbesFound));
        assert!(state.snapshot().pumps.is_empty());
    }

    #[test]
    fn test_min_cycle_pads_short_pass() {
        let state = SharedTelemetryState::new();
        let events = EventChannel::new();
        let shutdown = ShutdownSignal::new();
        let bus = ScriptedBus::new(&[PROBE_A], |_| Ok(20.0));
        let config = AirPumpConfig {
            conversion_ms: 1,
            min_cycle_ms: 40,
            ..AirPumpConfig::default()
        };
        let mut sampler = AirPumpSampler::new(bus, &state, &events, config);

        let started = Instant::now();
        let flow = block_on(sampler.sample_once(&shutdown)).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(started.elapsed().as_millis() >= 40);
    }
}
