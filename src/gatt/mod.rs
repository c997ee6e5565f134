//! GATT command layer
//!
//! One thin wrapper per BGAPI command class (system, gap, link,
//! attribute client): payload builders over the command channel plus
//! pure decoders that turn raw event packets into typed events. All
//! session bookkeeping lives a layer up in [`crate::central`].

pub mod attclient;
pub mod gap;
pub mod link;
pub mod system;
pub mod types;

pub use attclient::{AttClientCommands, AttClientEvent, AttributeValueKind};
pub use gap::{AddressType, DiscoverMode, GapCommands, ScanRecord};
pub use link::{ConnectionFlags, LinkCommands, LinkEvent};
pub use system::SystemCommands;
pub use types::{AttUuid, BdAddr, ErrorCode, ErrorGroup};

use crate::bgapi::ProtocolError;
use thiserror::Error;

/// Faults of the GATT command and session layers.
///
/// Adapter-reported result codes ride in [`GattError::Remote`] as
/// values and never mix with transport faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Non-zero result code from the adapter or the remote peer.
    #[error("remote result: {0}")]
    Remote(ErrorCode),
    /// The characteristic lacks the property bit for this operation.
    #[error("operation not supported by this characteristic: {0}")]
    Unsupported(&'static str),
    /// Value exceeds the single-frame write limit and the operation
    /// cannot fall back to a prepared write.
    #[error("value of {0} bytes exceeds the {max}-byte write limit", max = attclient::MAX_SHORT_WRITE)]
    ValueTooLong(usize),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("device is not connected")]
    NotConnected,
    #[error("device is already connected or connecting")]
    AlreadyConnected,
    /// Procedure timed out and the adapter did not answer a ping.
    #[error("adapter unresponsive during procedure")]
    AdapterUnresponsive,
    /// Procedure timed out while the adapter itself is alive.
    #[error("procedure did not complete in time")]
    Timeout,
    /// Response payload shorter than the command dictates.
    #[error("truncated response payload")]
    TruncatedResponse,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Resolve a command result code at `offset`, turning non-zero into
/// [`GattError::Remote`].
pub(crate) fn check_result(payload: &[u8], offset: usize) -> Result<(), GattError> {
    let code = types::read_u16_le(payload, offset)
        .map(ErrorCode)
        .ok_or(GattError::TruncatedResponse)?;
    if code.is_ok() {
        Ok(())
    } else {
        Err(GattError::Remote(code))
    }
}
