//! Connection command class: per-link commands and status events.
//!
//! Named `link` to keep it apart from the transport-level
//! [`crate::bgapi::Connection`].

use super::types::{read_u16_le, BdAddr, ErrorCode};
use super::{check_result, AddressType, GattError};
use crate::bgapi::dispatch::EventPacket;
use crate::bgapi::{Connection, CLASS_CONNECTION};
use std::sync::Arc;
use tracing::debug;

const CMD_DISCONNECT: u8 = 0x00;
const CMD_GET_RSSI: u8 = 0x01;

pub const EVENT_STATUS: u8 = 0x00;
pub const EVENT_DISCONNECTED: u8 = 0x04;

const FLAG_CONNECTED: u8 = 0x01;
const FLAG_ENCRYPTED: u8 = 0x02;
const FLAG_COMPLETED: u8 = 0x04;
const FLAG_PARAMETERS_CHANGED: u8 = 0x08;

/// Decoded connection status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionFlags(pub u8);

impl ConnectionFlags {
    pub fn connected(&self) -> bool {
        self.0 & FLAG_CONNECTED != 0
    }

    pub fn encrypted(&self) -> bool {
        self.0 & FLAG_ENCRYPTED != 0
    }

    /// Connection establishment completed.
    pub fn completed(&self) -> bool {
        self.0 & FLAG_COMPLETED != 0
    }

    pub fn parameters_changed(&self) -> bool {
        self.0 & FLAG_PARAMETERS_CHANGED != 0
    }
}

/// Typed events of the connection class.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Status {
        handle: u8,
        flags: ConnectionFlags,
        address: BdAddr,
        address_type: AddressType,
        /// Connection interval in 1.25 ms units.
        interval: u16,
        /// Supervision timeout in 10 ms units.
        timeout: u16,
        latency: u16,
        /// Bond handle, 0xFF when not bonded.
        bonding: u8,
    },
    Disconnected {
        handle: u8,
        reason: ErrorCode,
    },
}

/// Decode a connection-class event packet.
pub fn decode_event(event: &EventPacket) -> Option<LinkEvent> {
    let payload = &event.payload;
    match event.command_id {
        EVENT_STATUS if payload.len() >= 16 => Some(LinkEvent::Status {
            handle: payload[0],
            flags: ConnectionFlags(payload[1]),
            address: BdAddr::from_wire(&payload[2..8])?,
            address_type: AddressType::from_u8(payload[8]),
            interval: read_u16_le(payload, 9)?,
            timeout: read_u16_le(payload, 11)?,
            latency: read_u16_le(payload, 13)?,
            bonding: payload[15],
        }),
        EVENT_DISCONNECTED if payload.len() >= 3 => Some(LinkEvent::Disconnected {
            handle: payload[0],
            reason: ErrorCode(read_u16_le(payload, 1)?),
        }),
        _ => None,
    }
}

/// Wrapper over the connection class of the adapter.
#[derive(Clone)]
pub struct LinkCommands {
    connection: Arc<Connection>,
}

impl LinkCommands {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Close a link. The disconnected event carries the reason.
    pub async fn disconnect(&self, handle: u8) -> Result<(), GattError> {
        debug!(handle, "disconnect");
        let response = self
            .connection
            .send(CLASS_CONNECTION, CMD_DISCONNECT, &[handle])
            .await?;
        check_result(&response, 1)
    }

    /// Current RSSI of a live link, in dBm.
    pub async fn rssi(&self, handle: u8) -> Result<i8, GattError> {
        let response = self
            .connection
            .send(CLASS_CONNECTION, CMD_GET_RSSI, &[handle])
            .await?;
        response
            .get(1)
            .map(|raw| *raw as i8)
            .ok_or(GattError::TruncatedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(command_id: u8, payload: Vec<u8>) -> EventPacket {
        EventPacket {
            class_id: CLASS_CONNECTION,
            command_id,
            payload,
        }
    }

    #[test]
    fn test_decode_status_event() {
        let payload = vec![
            0x01, // handle
            0x05, // connected | completed
            0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // address, reversed
            0x00, // public
            0x3C, 0x00, // interval 60
            0x64, 0x00, // timeout 100
            0x00, 0x00, // latency 0
            0xFF, // no bond
        ];
        let event = decode_event(&packet(EVENT_STATUS, payload)).unwrap();
        match event {
            LinkEvent::Status {
                handle,
                flags,
                address,
                interval,
                ..
            } => {
                assert_eq!(handle, 1);
                assert!(flags.connected());
                assert!(flags.completed());
                assert!(!flags.encrypted());
                assert_eq!(address.to_string(), "01:02:03:04:05:06");
                assert_eq!(interval, 60);
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_disconnected_event() {
        let event = decode_event(&packet(EVENT_DISCONNECTED, vec![0x01, 0x13, 0x02])).unwrap();
        assert_eq!(
            event,
            LinkEvent::Disconnected {
                handle: 1,
                reason: ErrorCode(0x0213),
            }
        );
    }

    #[test]
    fn test_decode_truncated_event_dropped() {
        assert!(decode_event(&packet(EVENT_STATUS, vec![0x01, 0x05])).is_none());
        assert!(decode_event(&packet(0x02, vec![])).is_none());
    }
}
