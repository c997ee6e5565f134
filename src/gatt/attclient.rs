//! Attribute client command class: ATT procedures against a remote
//! GATT server.
//!
//! Every procedure-starting command returns once the adapter accepts
//! it; results stream back as events and the procedure ends with a
//! completion event. The session layer owns that bookkeeping.

use super::types::{read_u16_le, AttUuid, ErrorCode};
use super::{check_result, GattError};
use crate::bgapi::dispatch::EventPacket;
use crate::bgapi::{Connection, CLASS_ATTRIBUTE_CLIENT};
use std::sync::Arc;
use tracing::trace;

const CMD_READ_BY_GROUP_TYPE: u8 = 0x01;
const CMD_READ_BY_TYPE: u8 = 0x02;
const CMD_FIND_INFORMATION: u8 = 0x03;
const CMD_READ_BY_HANDLE: u8 = 0x04;
const CMD_ATTRIBUTE_WRITE: u8 = 0x05;
const CMD_WRITE_COMMAND: u8 = 0x06;
const CMD_INDICATE_CONFIRM: u8 = 0x07;
const CMD_READ_LONG: u8 = 0x08;
const CMD_PREPARE_WRITE: u8 = 0x09;
const CMD_EXECUTE_WRITE: u8 = 0x0A;
const CMD_READ_MULTIPLE: u8 = 0x0B;

pub const EVENT_INDICATED: u8 = 0x00;
pub const EVENT_PROCEDURE_COMPLETED: u8 = 0x01;
pub const EVENT_GROUP_FOUND: u8 = 0x02;
pub const EVENT_FIND_INFORMATION_FOUND: u8 = 0x04;
pub const EVENT_ATTRIBUTE_VALUE: u8 = 0x05;
pub const EVENT_READ_MULTIPLE_RESPONSE: u8 = 0x06;

/// Largest value a single acknowledged or unacknowledged write carries.
pub const MAX_SHORT_WRITE: usize = 20;
/// Fragment size for queued prepare-write chunks.
pub const PREPARE_WRITE_CHUNK: usize = 18;

/// Why an attribute value event arrived; selects the bookkeeping the
/// session layer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeValueKind {
    /// Response to a plain read.
    Read = 0x00,
    /// Unsolicited notification.
    Notify = 0x01,
    /// Indication (acknowledged by the stack or via indicate_confirm).
    Indicate = 0x02,
    /// Result row of a read-by-type sweep.
    ReadByType = 0x03,
    /// One fragment of a long read.
    ReadBlob = 0x04,
    /// Indication that demands an explicit confirm.
    IndicateRspReq = 0x05,
}

impl AttributeValueKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Read),
            0x01 => Some(Self::Notify),
            0x02 => Some(Self::Indicate),
            0x03 => Some(Self::ReadByType),
            0x04 => Some(Self::ReadBlob),
            0x05 => Some(Self::IndicateRspReq),
            _ => None,
        }
    }
}

/// Typed events of the attribute client class.
#[derive(Debug, Clone, PartialEq)]
pub enum AttClientEvent {
    /// A service group row from read-by-group-type.
    GroupFound {
        handle: u8,
        start: u16,
        end: u16,
        uuid: AttUuid,
    },
    /// A handle/type row from find-information.
    InformationFound {
        handle: u8,
        attribute: u16,
        uuid: AttUuid,
    },
    /// Attribute data; `kind` says which procedure it belongs to.
    AttributeValue {
        handle: u8,
        attribute: u16,
        kind: AttributeValueKind,
        data: Vec<u8>,
    },
    /// The running ATT procedure finished.
    ProcedureCompleted {
        handle: u8,
        result: ErrorCode,
        attribute: u16,
    },
    /// The remote confirmed an indication we sent. Client role never
    /// sees this for its own subscriptions.
    Indicated { handle: u8, attribute: u16 },
    /// Concatenated data from a read-multiple request.
    ReadMultiple { handle: u8, data: Vec<u8> },
}

/// Decode an attribute-client event packet. Unknown event ids and
/// unknown value kinds are dropped with a trace log.
pub fn decode_event(event: &EventPacket) -> Option<AttClientEvent> {
    let payload = &event.payload;
    match event.command_id {
        EVENT_GROUP_FOUND if payload.len() >= 6 => {
            let count = payload[5] as usize;
            Some(AttClientEvent::GroupFound {
                handle: payload[0],
                start: read_u16_le(payload, 1)?,
                end: read_u16_le(payload, 3)?,
                uuid: AttUuid::from_wire(payload.get(6..6 + count)?),
            })
        }
        EVENT_FIND_INFORMATION_FOUND if payload.len() >= 4 => {
            let count = payload[3] as usize;
            Some(AttClientEvent::InformationFound {
                handle: payload[0],
                attribute: read_u16_le(payload, 1)?,
                uuid: AttUuid::from_wire(payload.get(4..4 + count)?),
            })
        }
        EVENT_ATTRIBUTE_VALUE if payload.len() >= 5 => {
            let Some(kind) = AttributeValueKind::from_u8(payload[3]) else {
                trace!(kind = payload[3], "unknown attribute value kind dropped");
                return None;
            };
            let count = payload[4] as usize;
            Some(AttClientEvent::AttributeValue {
                handle: payload[0],
                attribute: read_u16_le(payload, 1)?,
                kind,
                data: payload.get(5..5 + count)?.to_vec(),
            })
        }
        EVENT_PROCEDURE_COMPLETED if payload.len() >= 5 => {
            Some(AttClientEvent::ProcedureCompleted {
                handle: payload[0],
                result: ErrorCode(read_u16_le(payload, 1)?),
                attribute: read_u16_le(payload, 3)?,
            })
        }
        EVENT_INDICATED if payload.len() >= 3 => Some(AttClientEvent::Indicated {
            handle: payload[0],
            attribute: read_u16_le(payload, 1)?,
        }),
        EVENT_READ_MULTIPLE_RESPONSE if payload.len() >= 2 => {
            let count = payload[1] as usize;
            Some(AttClientEvent::ReadMultiple {
                handle: payload[0],
                data: payload.get(2..2 + count)?.to_vec(),
            })
        }
        other => {
            trace!(command_id = other, "unhandled attclient event");
            None
        }
    }
}

/// Wrapper over the attribute client class of the adapter.
#[derive(Clone)]
pub struct AttClientCommands {
    connection: Arc<Connection>,
}

impl AttClientCommands {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Sweep a handle range for groups of a type, typically primary
    /// services (0x2800). Rows arrive as group-found events.
    pub async fn read_by_group_type(
        &self,
        handle: u8,
        start: u16,
        end: u16,
        group: &AttUuid,
    ) -> Result<(), GattError> {
        let payload = range_with_uuid(handle, start, end, group);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_READ_BY_GROUP_TYPE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Read all attributes of a type in a handle range, typically
    /// characteristic declarations (0x2803). Rows arrive as attribute
    /// value events of kind [`AttributeValueKind::ReadByType`].
    pub async fn read_by_type(
        &self,
        handle: u8,
        start: u16,
        end: u16,
        attribute_type: &AttUuid,
    ) -> Result<(), GattError> {
        let payload = range_with_uuid(handle, start, end, attribute_type);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_READ_BY_TYPE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Discover handles and their types across a range.
    pub async fn find_information(&self, handle: u8, start: u16, end: u16) -> Result<(), GattError> {
        let mut payload = Vec::with_capacity(5);
        payload.push(handle);
        payload.extend_from_slice(&start.to_le_bytes());
        payload.extend_from_slice(&end.to_le_bytes());
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_FIND_INFORMATION, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Read one attribute; the value arrives as an attribute value
    /// event of kind [`AttributeValueKind::Read`].
    pub async fn read_by_handle(&self, handle: u8, attribute: u16) -> Result<(), GattError> {
        let payload = handle_payload(handle, attribute);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_READ_BY_HANDLE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Read an attribute longer than a single ATT payload; fragments
    /// arrive as [`AttributeValueKind::ReadBlob`] events.
    pub async fn read_long(&self, handle: u8, attribute: u16) -> Result<(), GattError> {
        let payload = handle_payload(handle, attribute);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_READ_LONG, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Read several attributes in one request.
    pub async fn read_multiple(&self, handle: u8, attributes: &[u16]) -> Result<(), GattError> {
        let mut handles = Vec::with_capacity(attributes.len() * 2);
        for attribute in attributes {
            handles.extend_from_slice(&attribute.to_le_bytes());
        }
        let mut payload = Vec::with_capacity(2 + handles.len());
        payload.push(handle);
        payload.push(handles.len() as u8);
        payload.extend_from_slice(&handles);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_READ_MULTIPLE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Acknowledged write, up to [`MAX_SHORT_WRITE`] bytes; longer
    /// values are rejected. Completion arrives as a
    /// procedure-completed event.
    pub async fn write_request(
        &self,
        handle: u8,
        attribute: u16,
        data: &[u8],
    ) -> Result<(), GattError> {
        let payload = write_payload(handle, attribute, data)?;
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_ATTRIBUTE_WRITE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Unacknowledged write, up to [`MAX_SHORT_WRITE`] bytes; longer
    /// values are rejected since nothing can chunk them. No completion
    /// event follows.
    pub async fn write_command(
        &self,
        handle: u8,
        attribute: u16,
        data: &[u8],
    ) -> Result<(), GattError> {
        let payload = write_payload(handle, attribute, data)?;
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_WRITE_COMMAND, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Queue one fragment of a long write at `offset`.
    pub async fn prepare_write(
        &self,
        handle: u8,
        attribute: u16,
        offset: u16,
        data: &[u8],
    ) -> Result<(), GattError> {
        let chunk = &data[..data.len().min(PREPARE_WRITE_CHUNK)];
        let mut payload = Vec::with_capacity(6 + chunk.len());
        payload.push(handle);
        payload.extend_from_slice(&attribute.to_le_bytes());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.push(chunk.len() as u8);
        payload.extend_from_slice(chunk);
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_PREPARE_WRITE, &payload)
            .await?;
        check_result(&response, 1)
    }

    /// Commit (`true`) or cancel (`false`) the queued prepare writes.
    pub async fn execute_write(&self, handle: u8, commit: bool) -> Result<(), GattError> {
        let response = self
            .connection
            .send(
                CLASS_ATTRIBUTE_CLIENT,
                CMD_EXECUTE_WRITE,
                &[handle, u8::from(commit)],
            )
            .await?;
        check_result(&response, 1)
    }

    /// Manually confirm a received indication.
    pub async fn indicate_confirm(&self, handle: u8) -> Result<(), GattError> {
        let response = self
            .connection
            .send(CLASS_ATTRIBUTE_CLIENT, CMD_INDICATE_CONFIRM, &[handle])
            .await?;
        check_result(&response, 0)
    }
}

fn handle_payload(handle: u8, attribute: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(3);
    payload.push(handle);
    payload.extend_from_slice(&attribute.to_le_bytes());
    payload
}

fn range_with_uuid(handle: u8, start: u16, end: u16, uuid: &AttUuid) -> Vec<u8> {
    let wire = uuid.to_wire();
    let mut payload = Vec::with_capacity(6 + wire.len());
    payload.push(handle);
    payload.extend_from_slice(&start.to_le_bytes());
    payload.extend_from_slice(&end.to_le_bytes());
    payload.push(wire.len() as u8);
    payload.extend_from_slice(&wire);
    payload
}

fn write_payload(handle: u8, attribute: u16, data: &[u8]) -> Result<Vec<u8>, GattError> {
    if data.len() > MAX_SHORT_WRITE {
        return Err(GattError::ValueTooLong(data.len()));
    }
    let mut payload = Vec::with_capacity(4 + data.len());
    payload.push(handle);
    payload.extend_from_slice(&attribute.to_le_bytes());
    payload.push(data.len() as u8);
    payload.extend_from_slice(data);
    Ok(payload)
}
