//! BGAPI wire protocol engine
//!
//! Framing, the one-in-flight command/response channel, ordered event
//! dispatch, and the link lifecycle (open / awaiting-restore / closed).

pub mod connection;
pub mod dispatch;
pub mod frame;
pub mod transport;

pub use connection::{Connection, ConnectionConfig, LifecycleEvent, LinkState};
pub use dispatch::{EventDispatcher, EventKey, EventPacket};
pub use frame::{FrameDecoder, Packet, PacketHeader, PacketKind, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use transport::Transport;

use thiserror::Error;

// Command class identifiers carried in header byte 2.
pub const CLASS_SYSTEM: u8 = 0x00;
pub const CLASS_CONNECTION: u8 = 0x03;
pub const CLASS_ATTRIBUTE_CLIENT: u8 = 0x04;
pub const CLASS_GAP: u8 = 0x06;

/// Hard faults of the protocol engine.
///
/// Remote result codes reported by the adapter are *not* represented
/// here; they travel as [`crate::gatt::types::ErrorCode`] values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Transport read or write failed.
    #[error("transport I/O failure: {0}")]
    Io(String),
    /// The link was never opened or has been closed.
    #[error("link is not open")]
    NotOpen,
    /// A command is already in flight; BGAPI allows exactly one.
    #[error("a command is already in flight")]
    Busy,
    /// Payload exceeds the 11-bit frame length field.
    #[error("payload of {0} bytes exceeds the {max}-byte limit", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),
    /// No response arrived within the command timeout.
    #[error("no response within the command timeout")]
    Timeout,
    /// The response header does not match the in-flight command.
    #[error(
        "response mismatch: sent class 0x{sent_class:02X} command 0x{sent_command:02X}, \
         received class 0x{received_class:02X} command 0x{received_command:02X}"
    )]
    ResponseMismatch {
        sent_class: u8,
        sent_command: u8,
        received_class: u8,
        received_command: u8,
    },
    /// The adapter is detached; the link is waiting for a re-attach.
    #[error("adapter detached, awaiting restore")]
    AwaitingRestore,
    /// Configuration rejected by `validate()`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
