//! A primary service: a UUID plus the handle range its attributes
//! occupy. Characteristics are discovered lazily on first request and
//! cached until the link drops.

use super::characteristic::Characteristic;
use super::device::Device;
use super::GattError;
use crate::gatt::types::AttUuid;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

pub struct Service {
    device: Weak<Device>,
    uuid: AttUuid,
    start: u16,
    end: u16,
    characteristics: RwLock<Vec<Arc<Characteristic>>>,
    discovered: RwLock<bool>,
}

impl Service {
    pub(crate) fn new(device: Weak<Device>, uuid: AttUuid, start: u16, end: u16) -> Arc<Self> {
        Arc::new(Self {
            device,
            uuid,
            start,
            end,
            characteristics: RwLock::new(Vec::new()),
            discovered: RwLock::new(false),
        })
    }

    pub fn uuid(&self) -> AttUuid {
        self.uuid.clone()
    }

    /// First attribute handle of the service group.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last attribute handle of the service group, inclusive.
    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn contains_handle(&self, handle: u16) -> bool {
        (self.start..=self.end).contains(&handle)
    }

    /// Characteristics of this service, discovered on first call.
    pub async fn characteristics(&self) -> Result<Vec<Arc<Characteristic>>, GattError> {
        if *self.discovered.read() {
            return Ok(self.characteristics.read().clone());
        }
        let device = self
            .device
            .upgrade()
            .ok_or(GattError::NotFound("device"))?;
        device.discover_characteristics(self).await?;
        *self.discovered.write() = true;
        Ok(self.characteristics.read().clone())
    }

    /// Find a characteristic by UUID, discovering if needed.
    pub async fn characteristic(&self, uuid: &AttUuid) -> Result<Arc<Characteristic>, GattError> {
        self.characteristics()
            .await?
            .into_iter()
            .find(|c| c.uuid() == *uuid)
            .ok_or(GattError::NotFound("characteristic"))
    }

    /// Already-discovered characteristic owning `handle` as its value
    /// handle, without triggering I/O.
    pub fn characteristic_by_value_handle(&self, handle: u16) -> Option<Arc<Characteristic>> {
        self.characteristics
            .read()
            .iter()
            .find(|c| c.value_handle() == handle)
            .cloned()
    }

    pub(crate) fn add_characteristic(&self, characteristic: Arc<Characteristic>) {
        self.characteristics.write().push(characteristic);
    }

    /// Already-discovered characteristics, without triggering I/O.
    pub fn cached_characteristics(&self) -> Vec<Arc<Characteristic>> {
        self.characteristics.read().clone()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("uuid", &self.uuid)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_handle_is_inclusive() {
        let service = Service::new(Weak::new(), AttUuid::short(0x180F), 0x0010, 0x0020);
        assert!(service.contains_handle(0x0010));
        assert!(service.contains_handle(0x0020));
        assert!(!service.contains_handle(0x0021));
        assert!(!service.contains_handle(0x000F));
    }
}
