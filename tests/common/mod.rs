//! In-memory fake adapter for session tests.
//!
//! The far end of a duplex pipe plays the dongle: it reads command
//! frames, replies with scripted responses and injects events.

#![allow(dead_code)]

use bgble::{
    BdAddr, Central, CentralConfig, CentralDelegate, ConnectionConfig, Device, ErrorCode,
    Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

pub const CLASS_SYSTEM: u8 = 0x00;
pub const CLASS_CONNECTION: u8 = 0x03;
pub const CLASS_ATTCLIENT: u8 = 0x04;
pub const CLASS_GAP: u8 = 0x06;

/// What the central reported through its delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    Found(BdAddr),
    Updated(BdAddr),
    Disconnected(BdAddr, u16),
    AdapterDetached,
    AdapterRestored,
}

pub struct RecordingDelegate {
    tx: mpsc::UnboundedSender<DelegateEvent>,
}

impl RecordingDelegate {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DelegateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl CentralDelegate for RecordingDelegate {
    fn device_found(&self, device: &Arc<Device>) {
        let _ = self.tx.send(DelegateEvent::Found(device.address()));
    }

    fn device_updated(&self, device: &Arc<Device>) {
        let _ = self.tx.send(DelegateEvent::Updated(device.address()));
    }

    fn device_disconnected(&self, device: &Arc<Device>, reason: ErrorCode) {
        let _ = self
            .tx
            .send(DelegateEvent::Disconnected(device.address(), reason.0));
    }

    fn adapter_detached(&self) {
        let _ = self.tx.send(DelegateEvent::AdapterDetached);
    }

    fn adapter_restored(&self) {
        let _ = self.tx.send(DelegateEvent::AdapterRestored);
    }
}

/// Wait for the next delegate event, with a guard against hangs.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<DelegateEvent>) -> DelegateEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a delegate event")
        .expect("delegate channel closed")
}

/// The dongle side of the pipe.
pub struct FakeAdapter {
    far: DuplexStream,
}

impl FakeAdapter {
    pub fn new(far: DuplexStream) -> Self {
        Self { far }
    }

    /// Read one command frame from the host.
    pub async fn read_command(&mut self) -> (u8, u8, Vec<u8>) {
        let mut header = [0u8; 4];
        self.far.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0] & 0x80, 0, "host sent an event-flagged frame");
        let len = (((header[0] & 0x07) as usize) << 8) | header[1] as usize;
        let mut payload = vec![0u8; len];
        self.far.read_exact(&mut payload).await.unwrap();
        (header[2], header[3], payload)
    }

    /// Read a command and assert its class and id.
    pub async fn expect_command(&mut self, class_id: u8, command_id: u8) -> Vec<u8> {
        let (class, command, payload) = self.read_command().await;
        assert_eq!(
            (class, command),
            (class_id, command_id),
            "unexpected command, payload {payload:02X?}"
        );
        payload
    }

    pub async fn respond(&mut self, class_id: u8, command_id: u8, payload: &[u8]) {
        self.write_frame(0x00, class_id, command_id, payload).await;
    }

    pub async fn send_event(&mut self, class_id: u8, command_id: u8, payload: &[u8]) {
        self.write_frame(0x80, class_id, command_id, payload).await;
    }

    async fn write_frame(&mut self, kind_bit: u8, class_id: u8, command_id: u8, payload: &[u8]) {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push(kind_bit | ((payload.len() >> 8) as u8 & 0x07));
        frame.push(payload.len() as u8);
        frame.push(class_id);
        frame.push(command_id);
        frame.extend_from_slice(payload);
        self.far.write_all(&frame).await.unwrap();
    }

    /// Serve the startup sequence `Central::open` runs.
    pub async fn serve_handshake(&mut self) {
        self.expect_command(CLASS_SYSTEM, 0x01).await; // hello
        self.respond(CLASS_SYSTEM, 0x01, &[]).await;
        self.expect_command(CLASS_SYSTEM, 0x02).await; // get address
        self.respond(CLASS_SYSTEM, 0x02, &adapter_address().to_wire())
            .await;
        self.expect_command(CLASS_SYSTEM, 0x06).await; // get connections
        self.respond(CLASS_SYSTEM, 0x06, &[3]).await;
        self.expect_command(CLASS_GAP, 0x04).await; // end procedure
        self.respond(CLASS_GAP, 0x04, &[0x00, 0x00]).await;
        self.expect_command(CLASS_GAP, 0x07).await; // scan parameters
        self.respond(CLASS_GAP, 0x07, &[0x00, 0x00]).await;
    }

    /// Serve one ATT procedure: ack the next command, replay `events`
    /// on the attclient class, then complete the procedure.
    pub async fn serve_procedure(
        &mut self,
        class_id: u8,
        command_id: u8,
        events: &[(u8, Vec<u8>)],
        completion: &[u8],
    ) -> Vec<u8> {
        let payload = self.expect_command(class_id, command_id).await;
        self.respond(class_id, command_id, &[payload[0], 0x00, 0x00])
            .await;
        for (event_id, event_payload) in events {
            self.send_event(CLASS_ATTCLIENT, *event_id, event_payload)
                .await;
        }
        self.send_event(CLASS_ATTCLIENT, 0x01, completion).await;
        payload
    }
}

pub fn adapter_address() -> BdAddr {
    "00:07:80:AA:BB:CC".parse().unwrap()
}

pub fn peripheral_address() -> BdAddr {
    "11:22:33:44:55:66".parse().unwrap()
}

pub fn test_config() -> CentralConfig {
    CentralConfig {
        connection: ConnectionConfig {
            command_timeout: Duration::from_secs(2),
            ..Default::default()
        },
        procedure_timeout: Duration::from_secs(2),
        // Long enough that the ticker never interferes with a test.
        liveness_interval: Duration::from_secs(600),
        ..Default::default()
    }
}

/// Open a central against a fake adapter, serving the handshake.
pub async fn open_central() -> (Central, FakeAdapter) {
    let (near, far) = tokio::io::duplex(4096);
    let mut adapter = FakeAdapter::new(far);
    let (central, adapter) = tokio::join!(
        Central::open(Transport::new("fake-dongle", near), test_config()),
        async {
            adapter.serve_handshake().await;
            adapter
        }
    );
    (central.expect("open against fake adapter"), adapter)
}

/// A scan event payload for `address` with the given AD fields.
pub fn scan_payload(address: &BdAddr, rssi: i8, packet_type: u8, name: Option<&str>) -> Vec<u8> {
    let mut ad = Vec::new();
    // flags: LE general discoverable
    ad.extend_from_slice(&[0x02, 0x01, 0x06]);
    if let Some(name) = name {
        ad.push(1 + name.len() as u8);
        ad.push(0x09);
        ad.extend_from_slice(name.as_bytes());
    }
    let mut payload = Vec::new();
    payload.push(rssi as u8);
    payload.push(packet_type);
    payload.extend_from_slice(&address.to_wire());
    payload.push(0x00); // public address
    payload.push(0xFF); // no bond
    payload.push(ad.len() as u8);
    payload.extend_from_slice(&ad);
    payload
}

/// A connection status event with the connected and completed flags.
pub fn status_payload(handle: u8, address: &BdAddr) -> Vec<u8> {
    let mut payload = vec![handle, 0x05];
    payload.extend_from_slice(&address.to_wire());
    payload.push(0x00); // public
    payload.extend_from_slice(&60u16.to_le_bytes()); // interval
    payload.extend_from_slice(&100u16.to_le_bytes()); // timeout
    payload.extend_from_slice(&0u16.to_le_bytes()); // latency
    payload.push(0xFF); // no bond
    payload
}
