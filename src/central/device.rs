//! Peripheral records: advertising state, connection lifecycle and
//! the single-slot GATT procedure engine.
//!
//! A [`Device`] is created on first sighting and lives for the rest
//! of the session. Everything connection-scoped (services,
//! descriptors, the procedure slot) is torn down on disconnect; the
//! advertising side (name, rssi, liveness) persists.

use super::characteristic::Characteristic;
use super::service::Service;
use super::{CentralShared, GattError, SharedRef};
use crate::gatt::attclient::{AttributeValueKind, MAX_SHORT_WRITE, PREPARE_WRITE_CHUNK};
use crate::gatt::gap::{AdvertisementKind, ScanRecord};
use crate::gatt::link::ConnectionFlags;
use crate::gatt::types::{
    AttUuid, BdAddr, ErrorCode, UUID_CHARACTERISTIC_DECLARATION, UUID_PRIMARY_SERVICE,
};
use crate::gatt::AddressType;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Sweeps that run off the end of the handle range complete with this
/// code rather than success.
const RESULT_ATTRIBUTE_NOT_FOUND: u16 = 0x040A;

/// Connection-layer state of a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    /// Link is up; attribute information not yet swept.
    Connected,
    /// Link is up and the descriptor table has been discovered.
    DescriptorsDiscovered,
}

/// How recently a non-connected peripheral has been sighted. Each
/// liveness tick without a sighting demotes one stage; any sighting
/// promotes straight back to `Alive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    TemporarilyLost,
    Unavailable,
    TotallyLost,
}

impl Liveness {
    fn demoted(self) -> Option<Liveness> {
        match self {
            Liveness::Alive => Some(Liveness::TemporarilyLost),
            Liveness::TemporarilyLost => Some(Liveness::Unavailable),
            Liveness::Unavailable => Some(Liveness::TotallyLost),
            Liveness::TotallyLost => None,
        }
    }
}

/// What a sighting did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SightingOutcome {
    /// First sighting ever.
    Found,
    /// Known device, data refreshed.
    Updated,
    /// A totally-lost device came back; no duplicate found event.
    Silent,
}

/// Advertising-derived facts about a peripheral.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub rssi: i8,
    pub flags: Vec<u8>,
    pub advertised_services: Vec<AttUuid>,
    pub tx_power: Option<i8>,
    /// Preferred connection interval range in milliseconds.
    pub connection_interval_ms: Option<(f64, f64)>,
    pub manufacturer_data: Option<Vec<u8>>,
    /// Bond handle reported by the adapter, 0xFF when unbonded.
    pub bond: u8,
    pub connectable_adverts: u32,
    pub non_connectable_adverts: u32,
    pub discoverable_adverts: u32,
    pub scan_responses: u32,
}

/// Parameters of the live link, from the last status event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkParameters {
    /// Connection interval in 1.25 ms units.
    pub interval: u16,
    /// Supervision timeout in 10 ms units.
    pub timeout: u16,
    pub latency: u16,
    pub bonding: u8,
}

struct ProcedureOutcome {
    result: ErrorCode,
}

type ProcedureSlot = oneshot::Sender<Result<ProcedureOutcome, GattError>>;

/// One remote peripheral.
pub struct Device {
    weak: Weak<Device>,
    central: SharedRef,
    address: BdAddr,
    address_type: AddressType,
    info: RwLock<DeviceInfo>,
    last_seen: Mutex<Instant>,
    liveness: RwLock<Liveness>,
    state: RwLock<DeviceState>,
    handle: RwLock<Option<u8>>,
    link: RwLock<LinkParameters>,

    services: RwLock<Vec<Arc<Service>>>,
    services_discovered: RwLock<bool>,
    descriptors: RwLock<BTreeMap<u16, AttUuid>>,
    characteristics_by_value: RwLock<HashMap<u16, Arc<Characteristic>>>,

    // One ATT procedure at a time per link.
    procedure_gate: tokio::sync::Mutex<()>,
    procedure: Mutex<Option<ProcedureSlot>>,
    value_buffer: Mutex<Vec<u8>>,

    connect_waiter: Mutex<Option<oneshot::Sender<()>>>,
    disconnect_waiter: Mutex<Option<oneshot::Sender<()>>>,
}

impl Device {
    pub(crate) fn new(central: SharedRef, record: &ScanRecord) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            central,
            address: record.address,
            address_type: record.address_type,
            info: RwLock::new(DeviceInfo::default()),
            last_seen: Mutex::new(Instant::now()),
            liveness: RwLock::new(Liveness::Alive),
            state: RwLock::new(DeviceState::Disconnected),
            handle: RwLock::new(None),
            link: RwLock::new(LinkParameters::default()),
            services: RwLock::new(Vec::new()),
            services_discovered: RwLock::new(false),
            descriptors: RwLock::new(BTreeMap::new()),
            characteristics_by_value: RwLock::new(HashMap::new()),
            procedure_gate: tokio::sync::Mutex::new(()),
            procedure: Mutex::new(None),
            value_buffer: Mutex::new(Vec::new()),
            connect_waiter: Mutex::new(None),
            disconnect_waiter: Mutex::new(None),
        })
    }

    pub fn address(&self) -> BdAddr {
        self.address
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// Advertised name, if any advertisement carried one.
    pub fn name(&self) -> Option<String> {
        self.info.read().name.clone()
    }

    /// Snapshot of the advertising-derived facts.
    pub fn info(&self) -> DeviceInfo {
        self.info.read().clone()
    }

    pub fn state(&self) -> DeviceState {
        *self.state.read()
    }

    pub fn liveness(&self) -> Liveness {
        *self.liveness.read()
    }

    /// Parameters of the live link from the last status event.
    pub fn link_parameters(&self) -> LinkParameters {
        *self.link.read()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            DeviceState::Connected | DeviceState::DescriptorsDiscovered
        )
    }

    // ================================================================
    // Connection lifecycle
    // ================================================================

    /// Establish a link, then sweep the attribute information table so
    /// descriptor lookups work. Resolves once both are done.
    pub async fn connect(&self) -> Result<(), GattError> {
        let shared = self.shared()?;
        {
            let mut state = self.state.write();
            if *state != DeviceState::Disconnected {
                return Err(GattError::AlreadyConnected);
            }
            *state = DeviceState::Connecting;
        }
        let (tx, rx) = oneshot::channel();
        *self.connect_waiter.lock() = Some(tx);

        let handle = match shared
            .gap
            .connect_direct(&self.address, self.address_type, &shared.config.connect)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                self.abort_connect(&shared, None).await;
                return Err(err);
            }
        };
        *self.handle.write() = Some(handle);
        if let Some(this) = self.weak.upgrade() {
            shared.bind_handle(handle, this);
        }

        match tokio::time::timeout(shared.config.procedure_timeout, rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.abort_connect(&shared, Some(handle)).await;
                return Err(GattError::NotConnected);
            }
            Err(_) => {
                self.abort_connect(&shared, Some(handle)).await;
                return Err(GattError::Timeout);
            }
        }

        self.discover_descriptors(&shared, handle).await?;
        *self.state.write() = DeviceState::DescriptorsDiscovered;
        Ok(())
    }

    async fn abort_connect(&self, shared: &Arc<CentralShared>, handle: Option<u8>) {
        // Cancel the pending connection attempt in the adapter.
        if let Err(err) = shared.gap.end_procedure().await {
            debug!(%err, "end_procedure after failed connect");
        }
        if let Some(handle) = handle {
            shared.unbind_handle(handle);
        }
        *self.handle.write() = None;
        self.connect_waiter.lock().take();
        *self.state.write() = DeviceState::Disconnected;
    }

    /// Tear the link down; resolves when the disconnected event lands.
    pub async fn disconnect(&self) -> Result<(), GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        let (tx, rx) = oneshot::channel();
        *self.disconnect_waiter.lock() = Some(tx);
        shared.link.disconnect(handle).await?;
        match tokio::time::timeout(shared.config.procedure_timeout, rx).await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.disconnect_waiter.lock().take();
                Err(GattError::Timeout)
            }
        }
    }

    /// RSSI of the live link, in dBm.
    pub async fn rssi(&self) -> Result<i8, GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        shared.link.rssi(handle).await
    }

    // ================================================================
    // Service and characteristic discovery
    // ================================================================

    /// Primary services, discovered on first call and cached until
    /// disconnect.
    pub async fn services(&self) -> Result<Vec<Arc<Service>>, GattError> {
        if *self.services_discovered.read() {
            return Ok(self.services.read().clone());
        }
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        let outcome = self
            .run_procedure(
                &shared,
                shared.attclient.read_by_group_type(
                    handle,
                    0x0001,
                    0xFFFF,
                    &AttUuid::short(UUID_PRIMARY_SERVICE),
                ),
            )
            .await?;
        check_sweep(outcome.result)?;
        *self.services_discovered.write() = true;
        Ok(self.services.read().clone())
    }

    /// Find a service by UUID, discovering if needed.
    pub async fn service(&self, uuid: &AttUuid) -> Result<Arc<Service>, GattError> {
        self.services()
            .await?
            .into_iter()
            .find(|service| service.uuid() == *uuid)
            .ok_or(GattError::NotFound("service"))
    }

    /// Find a characteristic by UUID across all services, discovering
    /// services and characteristics as needed.
    pub async fn characteristic(&self, uuid: &AttUuid) -> Result<Arc<Characteristic>, GattError> {
        for service in self.services().await? {
            if let Some(found) = service
                .characteristics()
                .await?
                .into_iter()
                .find(|c| c.uuid() == *uuid)
            {
                return Ok(found);
            }
        }
        Err(GattError::NotFound("characteristic"))
    }

    pub(crate) async fn discover_characteristics(
        &self,
        service: &Service,
    ) -> Result<(), GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        let outcome = self
            .run_procedure(
                &shared,
                shared.attclient.read_by_type(
                    handle,
                    service.start(),
                    service.end(),
                    &AttUuid::short(UUID_CHARACTERISTIC_DECLARATION),
                ),
            )
            .await?;
        check_sweep(outcome.result)
    }

    async fn discover_descriptors(
        &self,
        shared: &Arc<CentralShared>,
        handle: u8,
    ) -> Result<(), GattError> {
        let outcome = self
            .run_procedure(shared, shared.attclient.find_information(handle, 0x0001, 0xFFFF))
            .await?;
        check_sweep(outcome.result)
    }

    /// The first descriptor of type `uuid` after `declaration`, before
    /// the next characteristic declaration.
    pub(crate) fn find_descriptor(&self, declaration: u16, uuid: u16) -> Option<u16> {
        let descriptors = self.descriptors.read();
        for (attribute, att_uuid) in descriptors.range(declaration + 1..) {
            if att_uuid.as_short() == Some(UUID_CHARACTERISTIC_DECLARATION) {
                return None;
            }
            if att_uuid.as_short() == Some(uuid) {
                return Some(*attribute);
            }
        }
        None
    }

    // ================================================================
    // Attribute I/O
    // ================================================================

    /// Read one attribute value (single ATT payload).
    pub(crate) async fn read_attribute(&self, attribute: u16) -> Result<Vec<u8>, GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        self.value_buffer.lock().clear();
        let outcome = self
            .run_procedure(&shared, shared.attclient.read_by_handle(handle, attribute))
            .await?;
        check_remote(outcome.result)?;
        Ok(std::mem::take(&mut *self.value_buffer.lock()))
    }

    /// Read an attribute of arbitrary length; blob fragments are
    /// stitched in arrival order.
    pub(crate) async fn read_attribute_long(&self, attribute: u16) -> Result<Vec<u8>, GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        self.value_buffer.lock().clear();
        let outcome = self
            .run_procedure(&shared, shared.attclient.read_long(handle, attribute))
            .await?;
        check_remote(outcome.result)?;
        Ok(std::mem::take(&mut *self.value_buffer.lock()))
    }

    /// Read several attributes in one request; values come back
    /// concatenated, as the protocol delivers them.
    pub async fn read_multiple(&self, attributes: &[u16]) -> Result<Vec<u8>, GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        self.value_buffer.lock().clear();
        let outcome = self
            .run_procedure(&shared, shared.attclient.read_multiple(handle, attributes))
            .await?;
        check_remote(outcome.result)?;
        Ok(std::mem::take(&mut *self.value_buffer.lock()))
    }

    /// Acknowledged write. Values over [`MAX_SHORT_WRITE`] bytes go
    /// through the prepare/execute queue in [`PREPARE_WRITE_CHUNK`]
    /// fragments.
    pub(crate) async fn write_attribute(
        &self,
        attribute: u16,
        data: &[u8],
    ) -> Result<(), GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        if data.len() <= MAX_SHORT_WRITE {
            let outcome = self
                .run_procedure(&shared, shared.attclient.write_request(handle, attribute, data))
                .await?;
            return check_remote(outcome.result);
        }

        for (index, chunk) in data.chunks(PREPARE_WRITE_CHUNK).enumerate() {
            let offset = (index * PREPARE_WRITE_CHUNK) as u16;
            let queued = async {
                let outcome = self
                    .run_procedure(
                        &shared,
                        shared.attclient.prepare_write(handle, attribute, offset, chunk),
                    )
                    .await?;
                check_remote(outcome.result)
            }
            .await;
            if let Err(err) = queued {
                // Drop the half-built queue before reporting the fragment error.
                if let Err(cancel) = self.execute_write(&shared, handle, false).await {
                    warn!(%cancel, "cancelling prepared writes failed");
                }
                return Err(err);
            }
        }
        self.execute_write(&shared, handle, true).await
    }

    async fn execute_write(
        &self,
        shared: &Arc<CentralShared>,
        handle: u8,
        commit: bool,
    ) -> Result<(), GattError> {
        let outcome = self
            .run_procedure(shared, shared.attclient.execute_write(handle, commit))
            .await?;
        check_remote(outcome.result)
    }

    /// Unacknowledged write; fire and forget, no completion event.
    pub(crate) async fn write_attribute_unacked(
        &self,
        attribute: u16,
        data: &[u8],
    ) -> Result<(), GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        shared.attclient.write_command(handle, attribute, data).await
    }

    /// Confirm a received indication that requires an explicit
    /// response.
    pub(crate) async fn confirm_indication(&self) -> Result<(), GattError> {
        let shared = self.shared()?;
        let handle = self.connection_handle()?;
        shared.attclient.indicate_confirm(handle).await
    }

    /// Run one correlate-and-block ATT procedure: install the
    /// completion slot, fire the command, wait for the matching
    /// procedure-completed event. On timeout the adapter is pinged to
    /// tell a slow peripheral from a dead adapter.
    async fn run_procedure<F>(
        &self,
        shared: &Arc<CentralShared>,
        start: F,
    ) -> Result<ProcedureOutcome, GattError>
    where
        F: Future<Output = Result<(), GattError>>,
    {
        let _gate = self.procedure_gate.lock().await;
        let (tx, rx) = oneshot::channel();
        *self.procedure.lock() = Some(tx);

        if let Err(err) = start.await {
            self.procedure.lock().take();
            return Err(err);
        }

        match tokio::time::timeout(shared.config.procedure_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Slot dropped without a verdict: the link went away.
            Ok(Err(_)) => Err(GattError::NotConnected),
            Err(_) => {
                self.procedure.lock().take();
                match shared.system.hello().await {
                    Ok(()) => Err(GattError::Timeout),
                    Err(_) => Err(GattError::AdapterUnresponsive),
                }
            }
        }
    }

    // ================================================================
    // Event routing (called from the central dispatcher handlers)
    // ================================================================

    pub(crate) fn note_sighting(&self, record: &ScanRecord, created: bool) -> SightingOutcome {
        *self.last_seen.lock() = Instant::now();
        let previous = {
            let mut liveness = self.liveness.write();
            std::mem::replace(&mut *liveness, Liveness::Alive)
        };
        {
            let mut info = self.info.write();
            info.rssi = record.rssi;
            info.bond = record.bond;
            if let Some(name) = &record.name {
                if !name.is_empty() {
                    info.name = Some(name.clone());
                }
            }
            if !record.flags.is_empty() {
                info.flags = record.flags.clone();
            }
            for uuid in &record.services {
                if !info.advertised_services.contains(uuid) {
                    info.advertised_services.push(uuid.clone());
                }
            }
            if let Some(power) = record.tx_power {
                info.tx_power = Some(power);
            }
            if let Some(range) = record.connection_interval_ms {
                info.connection_interval_ms = Some(range);
            }
            if let Some(data) = &record.manufacturer_data {
                info.manufacturer_data = Some(data.clone());
            }
            match record.kind {
                AdvertisementKind::Connectable => info.connectable_adverts += 1,
                AdvertisementKind::NonConnectable => info.non_connectable_adverts += 1,
                AdvertisementKind::Discoverable => info.discoverable_adverts += 1,
                AdvertisementKind::ScanResponse => info.scan_responses += 1,
            }
        }
        if created {
            SightingOutcome::Found
        } else if previous == Liveness::TotallyLost {
            SightingOutcome::Silent
        } else {
            SightingOutcome::Updated
        }
    }

    /// One liveness tick: demote a stage when the device has not been
    /// sighted within `period`. Returns the new stage on change.
    pub(crate) fn liveness_tick(&self, period: Duration) -> Option<Liveness> {
        // Connected devices do not advertise; leave them alone.
        if self.is_connected() {
            return None;
        }
        if self.last_seen.lock().elapsed() <= period {
            return None;
        }
        let mut liveness = self.liveness.write();
        let next = liveness.demoted()?;
        *liveness = next;
        Some(next)
    }

    pub(crate) fn handle_status(
        &self,
        handle: u8,
        flags: ConnectionFlags,
        interval: u16,
        timeout: u16,
        latency: u16,
        bonding: u8,
    ) {
        *self.link.write() = LinkParameters {
            interval,
            timeout,
            latency,
            bonding,
        };
        if !(flags.connected() && flags.completed()) {
            trace!(handle, raw = flags.0, "partial status");
            return;
        }
        *self.handle.write() = Some(handle);
        {
            let mut state = self.state.write();
            if *state == DeviceState::Connecting || *state == DeviceState::Disconnected {
                *state = DeviceState::Connected;
            }
        }
        if let Some(waiter) = self.connect_waiter.lock().take() {
            let _ = waiter.send(());
        }
    }

    pub(crate) fn handle_disconnected(&self, reason: ErrorCode) {
        debug!(address = %self.address, %reason, "tearing down link state");
        *self.state.write() = DeviceState::Disconnected;
        *self.handle.write() = None;
        *self.link.write() = LinkParameters::default();
        self.services.write().clear();
        *self.services_discovered.write() = false;
        self.descriptors.write().clear();
        self.characteristics_by_value.write().clear();
        self.value_buffer.lock().clear();
        // Anything mid-flight loses its slot and observes NotConnected.
        self.procedure.lock().take();
        self.connect_waiter.lock().take();
        if let Some(waiter) = self.disconnect_waiter.lock().take() {
            let _ = waiter.send(());
        }
    }

    pub(crate) fn absorb_group_found(&self, start: u16, end: u16, uuid: AttUuid) {
        let service = Service::new(self.weak.clone(), uuid, start, end);
        trace!(address = %self.address, service = %service.uuid(), start, end, "service row");
        self.services.write().push(service);
    }

    pub(crate) fn absorb_descriptor(&self, attribute: u16, uuid: AttUuid) {
        self.descriptors.write().insert(attribute, uuid);
    }

    pub(crate) fn absorb_attribute_value(
        &self,
        attribute: u16,
        kind: AttributeValueKind,
        data: Vec<u8>,
    ) {
        match kind {
            AttributeValueKind::Read => {
                *self.value_buffer.lock() = data;
                // The stack sends no completion for plain reads.
                self.complete_procedure(ErrorCode::OK, attribute);
            }
            AttributeValueKind::ReadBlob => {
                self.value_buffer.lock().extend_from_slice(&data);
            }
            AttributeValueKind::ReadByType => self.absorb_declaration_row(attribute, &data),
            AttributeValueKind::Notify
            | AttributeValueKind::Indicate
            | AttributeValueKind::IndicateRspReq => {
                let subscriber = self
                    .characteristics_by_value
                    .read()
                    .get(&attribute)
                    .cloned();
                match subscriber {
                    Some(characteristic) => characteristic.deliver(kind, &data),
                    None => trace!(attribute, "value for unknown characteristic"),
                }
            }
        }
    }

    /// A characteristic declaration row: properties, value handle and
    /// the characteristic UUID.
    fn absorb_declaration_row(&self, declaration: u16, data: &[u8]) {
        if data.len() < 3 {
            warn!(declaration, "short characteristic declaration");
            return;
        }
        let properties = data[0];
        let value_handle = u16::from_le_bytes([data[1], data[2]]);
        let uuid = AttUuid::from_wire(&data[3..]);
        let service = self
            .services
            .read()
            .iter()
            .find(|service| service.contains_handle(declaration))
            .cloned();
        let Some(service) = service else {
            warn!(declaration, "declaration outside any known service");
            return;
        };
        let characteristic = Characteristic::new(
            self.weak.clone(),
            uuid,
            declaration,
            value_handle,
            properties,
        );
        self.characteristics_by_value
            .write()
            .insert(value_handle, characteristic.clone());
        service.add_characteristic(characteristic);
    }

    pub(crate) fn absorb_read_multiple(&self, data: Vec<u8>) {
        *self.value_buffer.lock() = data;
        self.complete_procedure(ErrorCode::OK, 0);
    }

    pub(crate) fn complete_procedure(&self, result: ErrorCode, attribute: u16) {
        let slot = self.procedure.lock().take();
        match slot {
            Some(tx) => {
                trace!(%result, attribute, "procedure completed");
                let _ = tx.send(Ok(ProcedureOutcome { result }));
            }
            None => trace!(%result, attribute, "completion with no procedure pending"),
        }
    }

    // ================================================================
    // Internals
    // ================================================================

    fn shared(&self) -> Result<Arc<CentralShared>, GattError> {
        self.central
            .upgrade()
            .ok_or(GattError::Protocol(crate::bgapi::ProtocolError::NotOpen))
    }

    fn connection_handle(&self) -> Result<u8, GattError> {
        (*self.handle.read()).ok_or(GattError::NotConnected)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("liveness", &self.liveness())
            .finish_non_exhaustive()
    }
}

/// Procedure completions that count as success for discovery sweeps:
/// an exhausted handle range reports attribute-not-found.
fn check_sweep(result: ErrorCode) -> Result<(), GattError> {
    if result.is_ok() || result.0 == RESULT_ATTRIBUTE_NOT_FOUND {
        Ok(())
    } else {
        Err(GattError::Remote(result))
    }
}

fn check_remote(result: ErrorCode) -> Result<(), GattError> {
    if result.is_ok() {
        Ok(())
    } else {
        Err(GattError::Remote(result))
    }
}
