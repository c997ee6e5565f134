//! A characteristic and its capability-gated I/O surface.
//!
//! Every operation checks the declared properties before touching the
//! wire, so an unsupported request fails fast with
//! [`GattError::Unsupported`] instead of a remote ATT error.

use super::device::Device;
use super::GattError;
use crate::gatt::attclient::AttributeValueKind;
use crate::gatt::types::{AttUuid, UUID_CHARACTERISTIC_DESCRIPTION, UUID_CLIENT_CONFIGURATION};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::trace;

const PROP_BROADCAST: u8 = 0x01;
const PROP_READ: u8 = 0x02;
const PROP_WRITE_NO_ACK: u8 = 0x04;
const PROP_WRITE: u8 = 0x08;
const PROP_NOTIFY: u8 = 0x10;
const PROP_INDICATE: u8 = 0x20;
const PROP_AUTHENTICATED_WRITE: u8 = 0x40;
const PROP_EXTENDED: u8 = 0x80;

// Client configuration values.
const CCC_OFF: [u8; 2] = [0x00, 0x00];
const CCC_NOTIFY: [u8; 2] = [0x01, 0x00];
const CCC_INDICATE: [u8; 2] = [0x02, 0x00];

/// Declared capability bits of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicProperties(pub u8);

impl CharacteristicProperties {
    pub fn broadcast(&self) -> bool {
        self.0 & PROP_BROADCAST != 0
    }

    pub fn read(&self) -> bool {
        self.0 & PROP_READ != 0
    }

    pub fn write_no_ack(&self) -> bool {
        self.0 & PROP_WRITE_NO_ACK != 0
    }

    pub fn write(&self) -> bool {
        self.0 & PROP_WRITE != 0
    }

    pub fn notify(&self) -> bool {
        self.0 & PROP_NOTIFY != 0
    }

    pub fn indicate(&self) -> bool {
        self.0 & PROP_INDICATE != 0
    }

    pub fn authenticated_write(&self) -> bool {
        self.0 & PROP_AUTHENTICATED_WRITE != 0
    }

    pub fn extended(&self) -> bool {
        self.0 & PROP_EXTENDED != 0
    }
}

/// Callback receiving notification and indication payloads.
pub type ValueCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

pub struct Characteristic {
    device: Weak<Device>,
    uuid: AttUuid,
    /// Handle of the declaration attribute; descriptors follow it.
    declaration: u16,
    /// Handle carrying the actual value.
    value_handle: u16,
    properties: CharacteristicProperties,
    subscriber: RwLock<Option<ValueCallback>>,
}

impl Characteristic {
    pub(crate) fn new(
        device: Weak<Device>,
        uuid: AttUuid,
        declaration: u16,
        value_handle: u16,
        properties: u8,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            uuid,
            declaration,
            value_handle,
            properties: CharacteristicProperties(properties),
            subscriber: RwLock::new(None),
        })
    }

    pub fn uuid(&self) -> AttUuid {
        self.uuid.clone()
    }

    pub fn value_handle(&self) -> u16 {
        self.value_handle
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    /// Read the value, single ATT payload.
    pub async fn read(&self) -> Result<Vec<u8>, GattError> {
        if !self.properties.read() {
            return Err(GattError::Unsupported("read"));
        }
        self.device()?.read_attribute(self.value_handle).await
    }

    /// Read a value of arbitrary length via the blob procedure.
    pub async fn read_long(&self) -> Result<Vec<u8>, GattError> {
        if !self.properties.read() {
            return Err(GattError::Unsupported("read"));
        }
        self.device()?.read_attribute_long(self.value_handle).await
    }

    /// Acknowledged write; long values go through the prepare/execute
    /// queue transparently.
    pub async fn write(&self, data: &[u8]) -> Result<(), GattError> {
        if !self.properties.write() {
            return Err(GattError::Unsupported("write"));
        }
        self.device()?.write_attribute(self.value_handle, data).await
    }

    /// Unacknowledged write; no delivery guarantee.
    pub async fn write_unacked(&self, data: &[u8]) -> Result<(), GattError> {
        if !self.properties.write_no_ack() {
            return Err(GattError::Unsupported("write without response"));
        }
        self.device()?
            .write_attribute_unacked(self.value_handle, data)
            .await
    }

    /// Enable notifications (or indications when the characteristic
    /// only indicates) and install the value callback.
    pub async fn subscribe(&self, callback: ValueCallback) -> Result<(), GattError> {
        let value = if self.properties.notify() {
            CCC_NOTIFY
        } else if self.properties.indicate() {
            CCC_INDICATE
        } else {
            return Err(GattError::Unsupported("notify or indicate"));
        };
        let device = self.device()?;
        let ccc = device
            .find_descriptor(self.declaration, UUID_CLIENT_CONFIGURATION)
            .ok_or(GattError::NotFound("client configuration descriptor"))?;
        *self.subscriber.write() = Some(callback);
        device.write_attribute_unacked(ccc, &value).await
    }

    /// Disable notifications and drop the callback.
    pub async fn unsubscribe(&self) -> Result<(), GattError> {
        let device = self.device()?;
        let ccc = device
            .find_descriptor(self.declaration, UUID_CLIENT_CONFIGURATION)
            .ok_or(GattError::NotFound("client configuration descriptor"))?;
        self.subscriber.write().take();
        device.write_attribute_unacked(ccc, &CCC_OFF).await
    }

    /// Confirm an indication whose kind demanded an explicit response.
    pub async fn confirm(&self) -> Result<(), GattError> {
        self.device()?.confirm_indication().await
    }

    /// Human-readable description from the 0x2901 descriptor, if the
    /// characteristic carries one.
    pub async fn description(&self) -> Result<String, GattError> {
        let device = self.device()?;
        let descriptor = device
            .find_descriptor(self.declaration, UUID_CHARACTERISTIC_DESCRIPTION)
            .ok_or(GattError::NotFound("description descriptor"))?;
        let raw = device.read_attribute(descriptor).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Hand an incoming notification or indication to the subscriber.
    pub(crate) fn deliver(&self, kind: AttributeValueKind, data: &[u8]) {
        let subscriber = self.subscriber.read().clone();
        match subscriber {
            Some(callback) => callback(data),
            None => trace!(handle = self.value_handle, ?kind, "value without subscriber"),
        }
    }

    fn device(&self) -> Result<Arc<Device>, GattError> {
        self.device.upgrade().ok_or(GattError::NotConnected)
    }
}

impl std::fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("declaration", &self.declaration)
            .field("value_handle", &self.value_handle)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_bits() {
        let props = CharacteristicProperties(PROP_READ | PROP_NOTIFY);
        assert!(props.read());
        assert!(props.notify());
        assert!(!props.write());
        assert!(!props.indicate());
        assert!(!props.broadcast());
        assert!(!props.extended());
    }

    #[tokio::test]
    async fn test_capability_gates_fail_before_io() {
        // No device behind the weak pointer; a gate failure must win.
        let characteristic = Characteristic::new(
            Weak::new(),
            AttUuid::short(0x2A19),
            0x0010,
            0x0011,
            PROP_READ,
        );
        assert!(matches!(
            characteristic.write(b"x").await,
            Err(GattError::Unsupported("write"))
        ));
        assert!(matches!(
            characteristic.write_unacked(b"x").await,
            Err(GattError::Unsupported(_))
        ));
        assert!(matches!(
            characteristic
                .subscribe(Arc::new(|_| {}))
                .await,
            Err(GattError::Unsupported(_))
        ));
    }
}
