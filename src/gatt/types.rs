//! Shared GATT wire types: device addresses, attribute UUIDs and the
//! adapter result-code table.
//!
//! Multi-byte fields are little-endian on the wire; addresses and
//! UUIDs additionally arrive byte-reversed.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Well-known 16-bit attribute types.
pub const UUID_PRIMARY_SERVICE: u16 = 0x2800;
pub const UUID_CHARACTERISTIC_DECLARATION: u16 = 0x2803;
pub const UUID_CHARACTERISTIC_DESCRIPTION: u16 = 0x2901;
pub const UUID_CLIENT_CONFIGURATION: u16 = 0x2902;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid bluetooth address: {0}")]
pub struct InvalidAddress(pub String);

/// A 6-byte Bluetooth device address, stored most-significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const LEN: usize = 6;

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Parse from wire order (reversed). Needs exactly 6 bytes.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut addr = [0u8; 6];
        for (i, byte) in bytes.iter().rev().enumerate() {
            addr[i] = *byte;
        }
        Some(Self(addr))
    }

    /// Serialize to wire order (reversed).
    pub fn to_wire(&self) -> [u8; 6] {
        let mut wire = self.0;
        wire.reverse();
        wire
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for BdAddr {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != Self::LEN {
            return Err(InvalidAddress(s.to_string()));
        }
        let mut addr = [0u8; 6];
        for (slot, part) in addr.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress(s.to_string()))?;
        }
        Ok(Self(addr))
    }
}

/// An attribute type: 16-bit SIG-assigned or 128-bit vendor UUID.
/// Stored big-endian; the wire carries it reversed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttUuid(Vec<u8>);

impl AttUuid {
    pub fn short(value: u16) -> Self {
        Self(value.to_be_bytes().to_vec())
    }

    /// Parse from wire order (reversed).
    pub fn from_wire(bytes: &[u8]) -> Self {
        Self(bytes.iter().rev().copied().collect())
    }

    /// Serialize to wire order (reversed).
    pub fn to_wire(&self) -> Vec<u8> {
        self.0.iter().rev().copied().collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_short(&self) -> bool {
        self.0.len() == 2
    }

    /// The 16-bit value, when this is a SIG-assigned short UUID.
    pub fn as_short(&self) -> Option<u16> {
        match self.0.as_slice() {
            [high, low] => Some(u16::from_be_bytes([*high, *low])),
            _ => None,
        }
    }
}

impl fmt::Display for AttUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl From<u16> for AttUuid {
    fn from(value: u16) -> Self {
        Self::short(value)
    }
}

/// Where in the stack a result code originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorGroup {
    Success,
    Api,
    Bluetooth,
    SecurityManager,
    Attribute,
    Unknown,
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorGroup::Success => "success",
            ErrorGroup::Api => "api",
            ErrorGroup::Bluetooth => "bluetooth",
            ErrorGroup::SecurityManager => "security-manager",
            ErrorGroup::Attribute => "attribute-protocol",
            ErrorGroup::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A result code reported by the adapter inside a response or
/// completion event. Carried as a value; hard transport faults live in
/// [`crate::ProtocolError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0x0000);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub fn group(&self) -> ErrorGroup {
        match self.0 {
            0x0000 => ErrorGroup::Success,
            0x0180..=0x01FF => ErrorGroup::Api,
            0x0200..=0x02FF => ErrorGroup::Bluetooth,
            0x0300..=0x03FF => ErrorGroup::SecurityManager,
            0x0400..=0x04FF => ErrorGroup::Attribute,
            _ => ErrorGroup::Unknown,
        }
    }

    /// Human-readable name per the adapter documentation.
    pub fn name(&self) -> &'static str {
        match self.0 {
            0x0000 => "command successfully executed",
            // BGAPI protocol
            0x0180 => "invalid parameter",
            0x0181 => "device in wrong state",
            0x0182 => "out of memory",
            0x0183 => "feature not implemented",
            0x0184 => "command not recognized",
            0x0185 => "timeout",
            0x0186 => "not connected",
            0x0187 => "flow",
            0x0188 => "user attribute",
            0x0189 => "invalid license key",
            0x018A => "command too long",
            0x018B => "out of bonds",
            // Bluetooth controller
            0x0205 => "authentication failure",
            0x0206 => "pin or key missing",
            0x0207 => "memory capacity exceeded",
            0x0208 => "connection timeout",
            0x0209 => "connection limit exceeded",
            0x020C => "command disallowed",
            0x0212 => "invalid command parameters",
            0x0213 => "remote user terminated connection",
            0x0216 => "connection terminated by local host",
            0x0222 => "ll response timeout",
            0x0228 => "ll instant passed",
            0x023A => "controller busy",
            0x023B => "unacceptable connection interval",
            0x023C => "directed advertising timeout",
            0x023D => "mic failure",
            0x023E => "connection failed to be established",
            // Security manager protocol
            0x0301 => "passkey entry failed",
            0x0302 => "oob data is not available",
            0x0303 => "authentication requirements",
            0x0304 => "confirm value failed",
            0x0305 => "pairing not supported",
            0x0306 => "encryption key size",
            0x0307 => "command not supported",
            0x0308 => "unspecified reason",
            0x0309 => "repeated attempts",
            0x030A => "invalid parameters",
            // Attribute protocol
            0x0401 => "invalid handle",
            0x0402 => "read not permitted",
            0x0403 => "write not permitted",
            0x0404 => "invalid pdu",
            0x0405 => "insufficient authentication",
            0x0406 => "request not supported",
            0x0407 => "invalid offset",
            0x0408 => "insufficient authorization",
            0x0409 => "prepare queue full",
            0x040A => "attribute not found",
            0x040B => "attribute not long",
            0x040C => "insufficient encryption key size",
            0x040D => "invalid attribute value length",
            0x040E => "unlikely error",
            0x040F => "insufficient encryption",
            0x0410 => "unsupported group type",
            0x0411 => "insufficient resources",
            0x0480 => "application error code",
            _ => "unknown result code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} {} ({})", self.0, self.name(), self.group())
    }
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Read a little-endian u16 at `offset`, if the slice is long enough.
pub(crate) fn read_u16_le(payload: &[u8], offset: usize) -> Option<u16> {
    let bytes = payload.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}
