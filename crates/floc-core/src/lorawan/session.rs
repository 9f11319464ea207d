//! OTAA credentials and the join state machine

use core::fmt;

use log::error;

use crate::config::CredentialsHex;
use crate::error::NodeError;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OtaaCredentials {
    pub dev_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
}

impl OtaaCredentials {
    pub fn from_hex(dev_eui: &str, app_eui: &str, app_key: &str) -> Result<Self, NodeError> {
        Ok(Self {
            dev_eui: decode_field("DevEUI", dev_eui)?,
            app_eui: decode_field("AppEUI", app_eui)?,
            app_key: decode_field("AppKey", app_key)?,
        })
    }

    pub fn parse(hex: &CredentialsHex<'_>) -> Result<Self, NodeError> {
        Self::from_hex(hex.dev_eui, hex.app_eui, hex.app_key)
    }
}

fn decode_field<const N: usize>(field: &'static str, text: &str) -> Result<[u8; N], NodeError> {
    let mut bytes = [0u8; N];
    hex::decode_to_slice(text.trim(), &mut bytes).map_err(|e| {
        error!("Invalid {} ({} hex digits expected): {}", field, N * 2, e);
        NodeError::InvalidCredential { field }
    })?;
    Ok(bytes)
}

struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

// AppKey is a secret and never printed
impl fmt::Debug for OtaaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtaaCredentials")
            .field("dev_eui", &format_args!("{}", HexBytes(&self.dev_eui)))
            .field("app_eui", &format_args!("{}", HexBytes(&self.app_eui)))
            .field("app_key", &format_args!("<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    NotJoined,
    Joining,
    Joined,
}

/// Join progress of the node. Status only ever moves forward.
pub struct JoinSession {
    credentials: OtaaCredentials,
    status: JoinStatus,
}

impl JoinSession {
    pub const fn new(credentials: OtaaCredentials) -> Self {
        Self {
            credentials,
            status: JoinStatus::NotJoined,
        }
    }

    /// Enter `Joining`. Allowed again while already joining so a restarted
    /// task can re-issue the join.
    pub fn begin(&mut self) -> Result<(), NodeError> {
        match self.status {
            JoinStatus::NotJoined | JoinStatus::Joining => {
                self.status = JoinStatus::Joining;
                Ok(())
            }
            JoinStatus::Joined => Err(NodeError::InvalidJoinTransition {
                from: JoinStatus::Joined,
                to: JoinStatus::Joining,
            }),
        }
    }

    pub fn mark_joined(&mut self) -> Result<(), NodeError> {
        match self.status {
            JoinStatus::Joining => {
                self.status = JoinStatus::Joined;
                Ok(())
            }
            from => Err(NodeError::InvalidJoinTransition {
                from,
                to: JoinStatus::Joined,
            }),
        }
    }

    pub const fn status(&self) -> JoinStatus {
        self.status
    }

    pub fn is_joined(&self) -> bool {
        self.status == JoinStatus::Joined
    }

    pub const fn credentials(&self) -> &OtaaCredentials {
        &self.credentials
    }
}
