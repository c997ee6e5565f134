//! BGAPI packet framing
//!
//! Every packet starts with a 4-byte header:
//!
//! ```text
//! [byte 0] bit 7: message type (0 = command/response, 1 = event)
//!          bit 3: technology domain (1 = alternate domain, skipped)
//!          bits 0-2: payload length, high 3 bits
//! [byte 1] payload length, low 8 bits (11-bit length, max 2047)
//! [byte 2] command class id
//! [byte 3] command / event id
//! [N]      payload
//! ```

use tracing::warn;

/// Largest payload the 11-bit length field can carry.
pub const MAX_PAYLOAD_LEN: usize = 2047;
/// Fixed header size.
pub const HEADER_LEN: usize = 4;

const MSG_TYPE_EVENT: u8 = 0x80;
const DOMAIN_ALTERNATE: u8 = 0x08;
const LEN_HIGH_MASK: u8 = 0x07;

/// Direction/kind of a packet, from header bit 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Reply to a command the host sent.
    Response,
    /// Unsolicited event from the adapter.
    Event,
}

/// Decoded 4-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Set on packets from the alternate (non-BLE) technology domain.
    pub alternate_domain: bool,
    /// Payload length, 0..=2047.
    pub payload_len: u16,
    pub class_id: u8,
    pub command_id: u8,
}

impl PacketHeader {
    /// Serialize to the 4-byte wire header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut byte0 = ((self.payload_len >> 8) as u8) & LEN_HIGH_MASK;
        if self.kind == PacketKind::Event {
            byte0 |= MSG_TYPE_EVENT;
        }
        if self.alternate_domain {
            byte0 |= DOMAIN_ALTERNATE;
        }
        [byte0, self.payload_len as u8, self.class_id, self.command_id]
    }

    /// Parse the 4-byte wire header. Total parse, every bit pattern maps
    /// to a header (lengths are capped by the 3-bit high field).
    pub fn from_bytes(bytes: [u8; HEADER_LEN]) -> Self {
        let kind = if bytes[0] & MSG_TYPE_EVENT != 0 {
            PacketKind::Event
        } else {
            PacketKind::Response
        };
        let payload_len = u16::from(bytes[0] & LEN_HIGH_MASK) << 8 | u16::from(bytes[1]);
        PacketHeader {
            kind,
            alternate_domain: bytes[0] & DOMAIN_ALTERNATE != 0,
            payload_len,
            class_id: bytes[2],
            command_id: bytes[3],
        }
    }
}

/// A complete framed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

/// Build an outbound command frame. Length validation happens at the
/// channel layer before this is called.
pub fn encode_command(class_id: u8, command_id: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
    let header = PacketHeader {
        kind: PacketKind::Response,
        alternate_domain: false,
        payload_len: payload.len() as u16,
        class_id,
        command_id,
    };
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Streaming frame accumulator for the serial byte stream.
///
/// Bytes go in via [`extend`](Self::extend); [`next_packet`](Self::next_packet)
/// surfaces a packet only once its header *and* full payload are
/// buffered. Alternate-domain packets are skipped whole so the stream
/// stays aligned; their payload is never surfaced.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered (header fragments included).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete packet, if one is fully buffered.
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            let header =
                PacketHeader::from_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
            let total = HEADER_LEN + header.payload_len as usize;
            if self.buf.len() < total {
                return None;
            }
            let frame: Vec<u8> = self.buf.drain(..total).collect();
            if header.alternate_domain {
                warn!(
                    class_id = header.class_id,
                    command_id = header.command_id,
                    len = header.payload_len,
                    "skipping alternate-domain packet"
                );
                continue;
            }
            return Some(Packet {
                header,
                payload: frame[HEADER_LEN..].to_vec(),
            });
        }
    }
}
