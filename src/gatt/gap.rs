//! GAP command class: discovery and connection establishment.
//!
//! Also holds the scan-response decoder, which unpacks the
//! advertisement (AD) structures into a [`ScanRecord`].

use super::types::{read_u16_le, AttUuid, BdAddr};
use super::{check_result, GattError};
use crate::bgapi::dispatch::EventPacket;
use crate::bgapi::{Connection, CLASS_GAP};
use crate::central::config::{ConnectParameters, ScanParameters};
use std::sync::Arc;
use tracing::{debug, trace};

const CMD_DISCOVER: u8 = 0x02;
const CMD_CONNECT_DIRECT: u8 = 0x03;
const CMD_END_PROCEDURE: u8 = 0x04;
const CMD_SET_SCAN_PARAMETERS: u8 = 0x07;

/// Scan event id within the GAP class.
pub const EVENT_SCAN: u8 = 0x00;

// AD structure types the driver understands.
const AD_FLAGS: u8 = 0x01;
const AD_INCOMPLETE_UUID16: u8 = 0x02;
const AD_COMPLETE_UUID16: u8 = 0x03;
const AD_COMPLETE_UUID128: u8 = 0x07;
const AD_SHORTENED_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_TX_POWER: u8 = 0x0A;
const AD_CONNECTION_INTERVAL_RANGE: u8 = 0x12;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// GAP discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DiscoverMode {
    Limited = 0x00,
    #[default]
    Generic = 0x01,
    Observation = 0x02,
}

/// Bluetooth address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AddressType {
    #[default]
    Public = 0x00,
    Random = 0x01,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Self {
        if value == AddressType::Random as u8 {
            AddressType::Random
        } else {
            AddressType::Public
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Kind of advertisement packet a sighting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementKind {
    Connectable,
    NonConnectable,
    ScanResponse,
    Discoverable,
}

impl AdvertisementKind {
    fn from_u8(value: u8) -> Self {
        match value {
            0x02 => AdvertisementKind::NonConnectable,
            0x04 => AdvertisementKind::ScanResponse,
            0x06 => AdvertisementKind::Discoverable,
            _ => AdvertisementKind::Connectable,
        }
    }
}

/// One decoded scan sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub address: BdAddr,
    pub address_type: AddressType,
    pub rssi: i8,
    pub kind: AdvertisementKind,
    /// Bond handle, 0xFF when no bond is known.
    pub bond: u8,
    /// AD flags field, empty when not advertised.
    pub flags: Vec<u8>,
    pub name: Option<String>,
    pub services: Vec<AttUuid>,
    pub tx_power: Option<i8>,
    /// Preferred connection interval range in milliseconds.
    pub connection_interval_ms: Option<(f64, f64)>,
    pub manufacturer_data: Option<Vec<u8>>,
}

/// Decode a GAP scan event payload. Returns `None` when the payload
/// is too short to carry the fixed fields; malformed AD structures
/// terminate AD parsing without discarding the sighting.
pub fn decode_scan(payload: &[u8]) -> Option<ScanRecord> {
    if payload.len() < 11 {
        return None;
    }
    let mut record = ScanRecord {
        address: BdAddr::from_wire(&payload[2..8])?,
        address_type: AddressType::from_u8(payload[8]),
        rssi: payload[0] as i8,
        kind: AdvertisementKind::from_u8(payload[1]),
        bond: payload[9],
        flags: Vec::new(),
        name: None,
        services: Vec::new(),
        tx_power: None,
        connection_interval_ms: None,
        manufacturer_data: None,
    };

    let ad_len = payload[10] as usize;
    let ad = payload.get(11..).unwrap_or(&[]);
    let ad = &ad[..ad_len.min(ad.len())];
    parse_ad_structures(ad, &mut record);
    Some(record)
}

fn parse_ad_structures(ad: &[u8], record: &mut ScanRecord) {
    let mut i = 0;
    while i < ad.len() {
        let entry_len = ad[i] as usize;
        if entry_len == 0 || i + 1 + entry_len > ad.len() {
            trace!(offset = i, "malformed AD structure, stopping");
            return;
        }
        let ad_type = ad[i + 1];
        let value = &ad[i + 2..i + 1 + entry_len];
        match ad_type {
            AD_FLAGS => record.flags = value.to_vec(),
            AD_INCOMPLETE_UUID16 | AD_COMPLETE_UUID16 => {
                for chunk in value.chunks_exact(2) {
                    record.services.push(AttUuid::from_wire(chunk));
                }
            }
            AD_COMPLETE_UUID128 => {
                for chunk in value.chunks_exact(16) {
                    record.services.push(AttUuid::from_wire(chunk));
                }
            }
            AD_SHORTENED_NAME | AD_COMPLETE_NAME => {
                record.name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AD_TX_POWER => {
                if let Some(power) = value.first() {
                    record.tx_power = Some(*power as i8);
                }
            }
            AD_CONNECTION_INTERVAL_RANGE => {
                if let (Some(min), Some(max)) = (read_u16_le(value, 0), read_u16_le(value, 2)) {
                    // Units of 1.25 ms per the GAP specification.
                    record.connection_interval_ms = Some((1.25 * min as f64, 1.25 * max as f64));
                }
            }
            AD_MANUFACTURER_DATA => record.manufacturer_data = Some(value.to_vec()),
            other => trace!(ad_type = other, "unhandled AD structure"),
        }
        i += entry_len + 1;
    }
}

/// Wrapper over the GAP class of the adapter.
#[derive(Clone)]
pub struct GapCommands {
    connection: Arc<Connection>,
}

impl GapCommands {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Configure scan interval/window and active scanning.
    pub async fn set_scan_parameters(&self, params: &ScanParameters) -> Result<(), GattError> {
        let mut payload = Vec::with_capacity(5);
        payload.extend_from_slice(&params.interval.to_le_bytes());
        payload.extend_from_slice(&params.window.to_le_bytes());
        payload.push(u8::from(params.active));
        let response = self
            .connection
            .send(CLASS_GAP, CMD_SET_SCAN_PARAMETERS, &payload)
            .await?;
        check_result(&response, 0)
    }

    /// Start discovery; sightings arrive as scan events.
    pub async fn discover(&self, mode: DiscoverMode) -> Result<(), GattError> {
        debug!(?mode, "starting discovery");
        let response = self
            .connection
            .send(CLASS_GAP, CMD_DISCOVER, &[mode as u8])
            .await?;
        check_result(&response, 0)
    }

    /// End the running GAP procedure (discovery or connection attempt).
    pub async fn end_procedure(&self) -> Result<(), GattError> {
        let response = self
            .connection
            .send(CLASS_GAP, CMD_END_PROCEDURE, &[])
            .await?;
        check_result(&response, 0)
    }

    /// Start direct connection establishment. Returns the connection
    /// handle; the link is up once the status event reports completion.
    pub async fn connect_direct(
        &self,
        address: &BdAddr,
        address_type: AddressType,
        params: &ConnectParameters,
    ) -> Result<u8, GattError> {
        let mut payload = Vec::with_capacity(15);
        payload.extend_from_slice(&address.to_wire());
        payload.push(address_type.as_u8());
        payload.extend_from_slice(&params.interval_min.to_le_bytes());
        payload.extend_from_slice(&params.interval_max.to_le_bytes());
        payload.extend_from_slice(&params.timeout.to_le_bytes());
        payload.extend_from_slice(&params.latency.to_le_bytes());

        debug!(%address, ?address_type, "connect direct");
        let response = self
            .connection
            .send(CLASS_GAP, CMD_CONNECT_DIRECT, &payload)
            .await?;
        let handle = *response.first().ok_or(GattError::TruncatedResponse)?;
        check_result(&response, 1)?;
        Ok(handle)
    }
}

/// Decode a GAP event packet, currently only scan sightings.
pub fn decode_event(event: &EventPacket) -> Option<ScanRecord> {
    match event.command_id {
        EVENT_SCAN => decode_scan(&event.payload),
        _ => None,
    }
}
