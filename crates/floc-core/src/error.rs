//! Node-wide error type

use core::fmt;

use thiserror_no_std::Error;

use crate::lorawan::session::JoinStatus;

/// Radio operation that failed, used to classify uplink failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioOperation {
    Join,
    Open,
    Configure,
    Send,
    Receive,
}

impl RadioOperation {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Open => "open session",
            Self::Configure => "configure session",
            Self::Send => "send",
            Self::Receive => "receive",
        }
    }
}

impl fmt::Display for RadioOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors surfaced by node tasks.
///
/// Driver errors are logged where they happen and mapped into one of these
/// variants, so the type stays `Copy` and can travel through the event channel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    #[error("{sensor} bus fault during {operation}")]
    BusFault {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("radio {0} failed")]
    Radio(RadioOperation),
    #[error("network join not confirmed after {attempts} polls")]
    JoinTimedOut { attempts: u32 },
    #[error("join session cannot move from {from:?} to {to:?}")]
    InvalidJoinTransition { from: JoinStatus, to: JoinStatus },
    #[error("invalid {field} credential")]
    InvalidCredential { field: &'static str },
    #[error("only {available} of 2 pump readings available")]
    PartialReadingSet { available: u8 },
    #[error("uplink payload encoding failed")]
    Encoding,
}
