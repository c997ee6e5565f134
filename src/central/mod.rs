//! GATT central session layer.
//!
//! [`Central`] owns the link, the per-class command wrappers and the
//! peripheral registry. Peripheral records are keyed by address,
//! mutated in place and never deleted; a live index by connection
//! handle routes connection-scoped events to the owning [`Device`].

pub mod characteristic;
pub mod config;
pub mod device;
pub mod service;

pub use crate::gatt::GattError;
pub use characteristic::Characteristic;
pub use config::CentralConfig;
pub use device::Device;
pub use service::Service;

use crate::bgapi::{
    Connection, EventKey, EventPacket, LifecycleEvent, Transport, CLASS_ATTRIBUTE_CLIENT,
    CLASS_CONNECTION, CLASS_GAP,
};
use crate::gatt::attclient::{self, AttClientCommands, AttClientEvent, EVENT_ATTRIBUTE_VALUE};
use crate::gatt::gap::{self, DiscoverMode, GapCommands, ScanRecord};
use crate::gatt::link::{self, LinkCommands, LinkEvent};
use crate::gatt::system::SystemCommands;
use crate::gatt::types::{BdAddr, ErrorCode};
use device::SightingOutcome;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Session callbacks. All methods default to no-ops; implement the
/// ones the application cares about.
pub trait CentralDelegate: Send + Sync {
    /// A peripheral was sighted for the first time.
    fn device_found(&self, _device: &Arc<Device>) {}
    /// An already-known peripheral was sighted again or changed state.
    fn device_updated(&self, _device: &Arc<Device>) {}
    /// A connected peripheral dropped its link.
    fn device_disconnected(&self, _device: &Arc<Device>, _reason: ErrorCode) {}
    /// The adapter was unplugged.
    fn adapter_detached(&self) {}
    /// The adapter came back after a re-attach.
    fn adapter_restored(&self) {}
}

pub(crate) struct CentralShared {
    weak: Weak<CentralShared>,
    pub(crate) config: CentralConfig,
    pub(crate) connection: Arc<Connection>,
    pub(crate) system: SystemCommands,
    pub(crate) gap: GapCommands,
    pub(crate) link: LinkCommands,
    pub(crate) attclient: AttClientCommands,
    adapter_address: RwLock<Option<BdAddr>>,
    max_connections: RwLock<u8>,
    devices_by_address: RwLock<HashMap<BdAddr, Arc<Device>>>,
    devices_by_handle: RwLock<HashMap<u8, Arc<Device>>>,
    delegate: RwLock<Option<Arc<dyn CentralDelegate>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// A BLE central bound to one BGAPI adapter.
#[derive(Clone)]
pub struct Central {
    shared: Arc<CentralShared>,
}

impl Central {
    /// Open the adapter, run the startup sequence (liveness ping,
    /// adapter address, connection capacity, stale-procedure cleanup,
    /// scan parameters) and start the liveness ticker.
    pub async fn open(transport: Transport, config: CentralConfig) -> Result<Self, GattError> {
        config.validate()?;
        let connection = Connection::open(transport, config.connection.clone())?;
        let shared = Arc::new_cyclic(|weak| CentralShared {
            weak: weak.clone(),
            system: SystemCommands::new(connection.clone()),
            gap: GapCommands::new(connection.clone()),
            link: LinkCommands::new(connection.clone()),
            attclient: AttClientCommands::new(connection.clone()),
            config,
            connection,
            adapter_address: RwLock::new(None),
            max_connections: RwLock::new(0),
            devices_by_address: RwLock::new(HashMap::new()),
            devices_by_handle: RwLock::new(HashMap::new()),
            delegate: RwLock::new(None),
            background: Mutex::new(Vec::new()),
        });
        shared.register_routing();
        shared.spawn_lifecycle_watch();

        shared.system.hello().await?;
        let address = shared.system.address().await?;
        *shared.adapter_address.write() = Some(address);
        let capacity = shared.system.max_connections().await?;
        *shared.max_connections.write() = capacity;
        // A procedure may still be running from a previous host session.
        if let Err(err) = shared.gap.end_procedure().await {
            debug!(%err, "no stale procedure to end");
        }
        shared.gap.set_scan_parameters(&shared.config.scan).await?;
        shared.spawn_liveness_ticker();

        info!(%address, capacity, "central ready");
        Ok(Self { shared })
    }

    /// Install the session delegate, replacing any previous one.
    pub fn set_delegate(&self, delegate: Arc<dyn CentralDelegate>) {
        *self.shared.delegate.write() = Some(delegate);
    }

    /// Start GAP discovery; sightings surface through the delegate and
    /// the registry.
    pub async fn start_discovery(&self, mode: DiscoverMode) -> Result<(), GattError> {
        self.shared.gap.discover(mode).await
    }

    pub async fn stop_discovery(&self) -> Result<(), GattError> {
        self.shared.gap.end_procedure().await
    }

    /// The adapter's own address, known after a successful open.
    pub fn adapter_address(&self) -> Option<BdAddr> {
        *self.shared.adapter_address.read()
    }

    /// Simultaneous connections the adapter supports.
    pub fn max_connections(&self) -> u8 {
        *self.shared.max_connections.read()
    }

    /// Look up a peripheral record by address.
    pub fn device(&self, address: &BdAddr) -> Option<Arc<Device>> {
        self.shared.devices_by_address.read().get(address).cloned()
    }

    /// Every peripheral record seen so far.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.shared
            .devices_by_address
            .read()
            .values()
            .cloned()
            .collect()
    }

    /// The underlying link, for lifecycle subscriptions.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.shared.connection
    }

    /// Hot-unplug: fail in-flight work and wait for [`attach`](Self::attach).
    pub fn detach(&self) {
        self.shared.connection.detach();
    }

    /// Hot-replug on a fresh transport. Registry, handlers and
    /// delegate survive; dropped links do not.
    pub async fn attach(&self, transport: Transport) -> Result<(), GattError> {
        self.shared.connection.attach(transport).await?;
        Ok(())
    }

    /// Shut the session down for good.
    pub async fn close(&self) {
        for task in self.shared.background.lock().drain(..) {
            task.abort();
        }
        self.shared.connection.close().await;
    }
}

impl CentralShared {
    fn register_routing(&self) {
        let dispatcher = self.connection.dispatcher();

        let weak = self.weak.clone();
        dispatcher.register(EventKey::class(CLASS_GAP), move |event: EventPacket| {
            let Some(shared) = weak.upgrade() else { return };
            if let Some(record) = gap::decode_event(&event) {
                shared.handle_scan(record);
            }
        });

        let weak = self.weak.clone();
        dispatcher.register(
            EventKey::class(CLASS_CONNECTION),
            move |event: EventPacket| {
                let Some(shared) = weak.upgrade() else { return };
                if let Some(event) = link::decode_event(&event) {
                    shared.handle_link_event(event);
                }
            },
        );

        // Wildcard covers discovery rows, completions and indications;
        // the busiest stream (attribute values) gets its own queue.
        let weak = self.weak.clone();
        dispatcher.register(
            EventKey::class(CLASS_ATTRIBUTE_CLIENT),
            move |event: EventPacket| {
                let Some(shared) = weak.upgrade() else { return };
                if let Some(event) = attclient::decode_event(&event) {
                    shared.handle_att_event(event);
                }
            },
        );

        let weak = self.weak.clone();
        dispatcher.register(
            EventKey::exact(CLASS_ATTRIBUTE_CLIENT, EVENT_ATTRIBUTE_VALUE),
            move |event: EventPacket| {
                let Some(shared) = weak.upgrade() else { return };
                if let Some(event) = attclient::decode_event(&event) {
                    shared.handle_att_event(event);
                }
            },
        );
    }

    fn spawn_lifecycle_watch(&self) {
        let weak = self.weak.clone();
        let mut lifecycle = self.connection.subscribe_lifecycle();
        let task = tokio::spawn(async move {
            while let Some(event) = next_lifecycle_event(&mut lifecycle).await {
                let Some(shared) = weak.upgrade() else { break };
                match event {
                    LifecycleEvent::Detached => {
                        shared.invalidate_links();
                        if let Some(delegate) = shared.delegate() {
                            delegate.adapter_detached();
                        }
                    }
                    LifecycleEvent::Restored => {
                        if let Some(delegate) = shared.delegate() {
                            delegate.adapter_restored();
                        }
                    }
                    LifecycleEvent::Closed => break,
                }
            }
        });
        self.background.lock().push(task);
    }

    fn spawn_liveness_ticker(&self) {
        let weak = self.weak.clone();
        let period = self.config.liveness_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                shared.liveness_tick();
            }
        });
        self.background.lock().push(task);
    }

    fn liveness_tick(&self) {
        let devices: Vec<Arc<Device>> =
            self.devices_by_address.read().values().cloned().collect();
        let delegate = self.delegate();
        for device in devices {
            if let Some(stage) = device.liveness_tick(self.config.liveness_interval) {
                debug!(address = %device.address(), ?stage, "liveness stage change");
                if let Some(delegate) = &delegate {
                    delegate.device_updated(&device);
                }
            }
        }
    }

    fn handle_scan(&self, record: ScanRecord) {
        let (device, created) = {
            let mut devices = self.devices_by_address.write();
            match devices.get(&record.address) {
                Some(device) => (device.clone(), false),
                None => {
                    let device = Device::new(self.weak.clone(), &record);
                    devices.insert(record.address, device.clone());
                    (device, true)
                }
            }
        };
        let outcome = device.note_sighting(&record, created);
        match outcome {
            SightingOutcome::Found => {
                info!(address = %record.address, rssi = record.rssi, "device found");
                if let Some(delegate) = self.delegate() {
                    delegate.device_found(&device);
                }
            }
            SightingOutcome::Updated => {
                if let Some(delegate) = self.delegate() {
                    delegate.device_updated(&device);
                }
            }
            SightingOutcome::Silent => {
                trace!(address = %record.address, "sighting re-promoted a lost device");
            }
        }
    }

    fn handle_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Status {
                handle,
                flags,
                address,
                interval,
                timeout,
                latency,
                bonding,
                ..
            } => {
                let Some(device) = self.devices_by_address.read().get(&address).cloned() else {
                    warn!(%address, "status event for unknown device");
                    return;
                };
                if flags.connected() {
                    self.devices_by_handle.write().insert(handle, device.clone());
                }
                device.handle_status(handle, flags, interval, timeout, latency, bonding);
            }
            LinkEvent::Disconnected { handle, reason } => {
                let device = self.devices_by_handle.write().remove(&handle);
                let Some(device) = device else {
                    debug!(handle, %reason, "disconnect for unbound handle");
                    return;
                };
                info!(address = %device.address(), %reason, "device disconnected");
                device.handle_disconnected(reason);
                if let Some(delegate) = self.delegate() {
                    delegate.device_disconnected(&device, reason);
                }
            }
        }
    }

    fn handle_att_event(&self, event: AttClientEvent) {
        let handle = match &event {
            AttClientEvent::GroupFound { handle, .. }
            | AttClientEvent::InformationFound { handle, .. }
            | AttClientEvent::AttributeValue { handle, .. }
            | AttClientEvent::ProcedureCompleted { handle, .. }
            | AttClientEvent::Indicated { handle, .. }
            | AttClientEvent::ReadMultiple { handle, .. } => *handle,
        };
        let Some(device) = self.devices_by_handle.read().get(&handle).cloned() else {
            debug!(handle, "attclient event for unbound handle");
            return;
        };
        match event {
            AttClientEvent::GroupFound {
                start, end, uuid, ..
            } => device.absorb_group_found(start, end, uuid),
            AttClientEvent::InformationFound {
                attribute, uuid, ..
            } => device.absorb_descriptor(attribute, uuid),
            AttClientEvent::AttributeValue {
                attribute,
                kind,
                data,
                ..
            } => device.absorb_attribute_value(attribute, kind, data),
            AttClientEvent::ProcedureCompleted {
                result, attribute, ..
            } => device.complete_procedure(result, attribute),
            AttClientEvent::ReadMultiple { data, .. } => device.absorb_read_multiple(data),
            AttClientEvent::Indicated { attribute, .. } => {
                trace!(handle, attribute, "remote confirmed indication");
            }
        }
    }

    fn invalidate_links(&self) {
        let dropped: Vec<Arc<Device>> =
            self.devices_by_handle.write().drain().map(|(_, d)| d).collect();
        for device in dropped {
            warn!(address = %device.address(), "link lost with adapter");
            device.handle_disconnected(ErrorCode(0x0208));
        }
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn CentralDelegate>> {
        self.delegate.read().clone()
    }

    pub(crate) fn bind_handle(&self, handle: u8, device: Arc<Device>) {
        self.devices_by_handle.write().insert(handle, device);
    }

    pub(crate) fn unbind_handle(&self, handle: u8) {
        self.devices_by_handle.write().remove(&handle);
    }
}

pub(crate) type SharedRef = Weak<CentralShared>;

/// Next lifecycle event, riding out a lagged receiver. `None` only
/// when the sender is gone.
async fn next_lifecycle_event(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
) -> Option<LifecycleEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "lifecycle notifications lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_watch_rides_out_lag() {
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(LifecycleEvent::Detached).unwrap();
        // Overruns the one-slot buffer; the receiver lags.
        tx.send(LifecycleEvent::Restored).unwrap();

        assert_eq!(
            next_lifecycle_event(&mut rx).await,
            Some(LifecycleEvent::Restored)
        );

        drop(tx);
        assert_eq!(next_lifecycle_event(&mut rx).await, None);
    }
}
