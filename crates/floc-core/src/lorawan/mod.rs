//! LoRaWAN join and uplink
//!
//! The MAC and PHY live in the radio driver. This module only sees the
//! [`LoRaRadio`] port: join with OTAA credentials, poll whether the join
//! completed, and open one short-lived [`RadioSession`] per uplink cycle.

pub mod packet;
pub mod session;
pub mod uplink;

pub use packet::{NO_DATA, UplinkPacket, encode};
pub use session::{JoinSession, JoinStatus, OtaaCredentials};
pub use uplink::{CycleOutcome, UplinkManager, UplinkStats};

use core::fmt::Debug;
use core::future::Future;

/// Receive buffer size for downlinks
pub const MAX_DOWNLINK_LEN: usize = 64;

/// Radio adapter. Region and activation mode are fixed when it is constructed.
pub trait LoRaRadio {
    type Error: Debug;

    type Session<'s>: RadioSession<Error = Self::Error>
    where
        Self: 's;

    /// Start an OTAA join. May not return until the network answers.
    fn join(
        &mut self,
        credentials: &OtaaCredentials,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn has_joined(&self) -> bool;

    /// Open a session for one send/receive exchange.
    fn open(&mut self) -> Result<Self::Session<'_>, Self::Error>;
}

pub trait RadioSession {
    type Error: Debug;

    fn set_data_rate(&mut self, data_rate: u8) -> Result<(), Self::Error>;

    /// In non-blocking mode `recv` returns 0 right away when nothing is queued.
    fn set_blocking(&mut self, blocking: bool) -> Result<(), Self::Error>;

    fn send(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;

    fn recv(&mut self, buffer: &mut [u8]) -> impl Future<Output = Result<usize, Self::Error>>;
}
