//! Uplink payload encoding
//!
//! Two layouts are supported:
//!
//! - **Legacy**, exactly 5 bytes, as decoded by the existing receiving
//!   system: `[fluid, ambient C, ambient %RH, pump0 C, pump1 C]`. Each value
//!   is a signed byte truncated toward zero and clamped to -127..=127, and a
//!   missing value is [`NO_DATA`].
//! - **Framed** (version 1), a postcard record carrying every discovered
//!   probe with one decimal of precision.

use heapless::Vec;
use log::error;
use serde::Serialize;

use crate::config::{PartialReadingPolicy, UplinkFormat};
use crate::error::NodeError;
use crate::state::{MAX_PUMP_PROBES, TelemetrySnapshot};

pub const LEGACY_PACKET_LEN: usize = 5;
/// Smallest LoRaWAN application payload across data rates and regions
pub const MAX_UPLINK_LEN: usize = 51;
/// Marks a missing value in the legacy layout. Outside the clamped value range.
pub const NO_DATA: u8 = 0x80;
pub const FRAMED_VERSION: u8 = 1;
/// Pump slots the receiving system expects
pub const PUMP_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkPacket {
    bytes: Vec<u8, MAX_UPLINK_LEN>,
    missing_pump_slots: u8,
}

impl UplinkPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of expected pump slots (by discovery order) without a measured value
    pub const fn missing_pump_slots(&self) -> u8 {
        self.missing_pump_slots
    }

    pub const fn available_pump_readings(&self) -> u8 {
        PUMP_SLOTS as u8 - self.missing_pump_slots
    }
}

#[derive(Serialize)]
struct FramedRecord<'a> {
    version: u8,
    fluid_level: Option<u8>,
    ambient_temperature_deci: Option<i16>,
    ambient_humidity_deci: Option<i16>,
    pumps: &'a [Option<i16>],
}

fn truncate_to_byte(whole: i32) -> u8 {
    whole.clamp(-127, 127) as i8 as u8
}

fn milli_to_deci(milli: i32) -> i16 {
    (milli / 100).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode a snapshot for transmission.
///
/// Fails with [`NodeError::PartialReadingSet`] only under
/// [`PartialReadingPolicy::SkipCycle`]; with the default policy missing
/// slots are filled and reported through [`UplinkPacket::missing_pump_slots`].
pub fn encode(
    snapshot: &TelemetrySnapshot,
    format: UplinkFormat,
    policy: PartialReadingPolicy,
) -> Result<UplinkPacket, NodeError> {
    let mut slots = [None; PUMP_SLOTS];
    for (slot, value) in slots.iter_mut().zip(snapshot.pump_values()) {
        *slot = value;
    }
    let available = slots.iter().filter(|slot| slot.is_some()).count() as u8;
    let missing_pump_slots = PUMP_SLOTS as u8 - available;

    if missing_pump_slots > 0 && policy == PartialReadingPolicy::SkipCycle {
        return Err(NodeError::PartialReadingSet { available });
    }

    let bytes = match format {
        UplinkFormat::Legacy => {
            let climate = snapshot.climate;
            let legacy: [u8; LEGACY_PACKET_LEN] = [
                snapshot.fluid_level.map_or(NO_DATA, |level| level.wire_value()),
                climate.map_or(NO_DATA, |c| truncate_to_byte(c.whole_degrees())),
                climate.map_or(NO_DATA, |c| truncate_to_byte(c.whole_percent())),
                slots[0].map_or(NO_DATA, |t| truncate_to_byte(t.whole_degrees().into())),
                slots[1].map_or(NO_DATA, |t| truncate_to_byte(t.whole_degrees().into())),
            ];
            Vec::from_slice(&legacy).map_err(|_| NodeError::Encoding)?
        }
        UplinkFormat::Framed => encode_framed(snapshot)?,
    };

    Ok(UplinkPacket {
        bytes,
        missing_pump_slots,
    })
}

fn encode_framed(snapshot: &TelemetrySnapshot) -> Result<Vec<u8, MAX_UPLINK_LEN>, NodeError> {
    let pumps: Vec<Option<i16>, MAX_PUMP_PROBES> = snapshot
        .pump_values()
        .map(|value| value.map(|t| t.0))
        .collect();
    let record = FramedRecord {
        version: FRAMED_VERSION,
        fluid_level: snapshot.fluid_level.map(|level| level.wire_value()),
        ambient_temperature_deci: snapshot
            .climate
            .map(|c| milli_to_deci(c.temperature_milli_celsius)),
        ambient_humidity_deci: snapshot
            .climate
            .map(|c| milli_to_deci(c.humidity_milli_percent)),
        pumps: &pumps,
    };

    let mut buffer = [0u8; MAX_UPLINK_LEN];
    let used = postcard::to_slice(&record, &mut buffer).map_err(|e| {
        error!("Framed uplink encoding failed: {:?}", e);
        NodeError::Encoding
    })?;
    Vec::from_slice(used).map_err(|_| NodeError::Encoding)
}
