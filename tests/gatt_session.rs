//! End-to-end session tests against an in-memory fake adapter:
//! discovery, connection, attribute I/O and subscriptions.

mod common;

use bgble::{AttUuid, Central, Device, DiscoverMode, ErrorCode, GattError};
use common::{
    next_event, open_central, peripheral_address, scan_payload, status_payload, DelegateEvent,
    FakeAdapter, RecordingDelegate, CLASS_ATTCLIENT, CLASS_CONNECTION, CLASS_GAP,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const CONN: u8 = 1;

/// Battery service with two characteristics:
///   0x0010 declaration, 0x0011 value (0x2A19, read|write|notify|cmd)
///   0x0012 client configuration, 0x0013 description
///   0x0014 declaration, 0x0015 value (0x2A20, read only)
const SERVICE_START: u16 = 0x000E;
const SERVICE_END: u16 = 0x001F;
const VALUE_HANDLE: u16 = 0x0011;
const CCC_HANDLE: u16 = 0x0012;
const READONLY_VALUE: u16 = 0x0015;

async fn serve_connect(adapter: &mut FakeAdapter) {
    adapter.expect_command(CLASS_GAP, 0x03).await;
    adapter.respond(CLASS_GAP, 0x03, &[CONN, 0x00, 0x00]).await;
    adapter
        .send_event(CLASS_CONNECTION, 0x00, &status_payload(CONN, &peripheral_address()))
        .await;

    // Attribute information sweep.
    let rows: &[(u16, u16)] = &[
        (0x0010, 0x2803),
        (VALUE_HANDLE, 0x2A19),
        (CCC_HANDLE, 0x2902),
        (0x0013, 0x2901),
        (0x0014, 0x2803),
        (READONLY_VALUE, 0x2A20),
    ];
    let events: Vec<(u8, Vec<u8>)> = rows
        .iter()
        .map(|(attribute, uuid)| {
            let mut payload = vec![CONN];
            payload.extend_from_slice(&attribute.to_le_bytes());
            payload.push(2);
            payload.extend_from_slice(&uuid.to_le_bytes());
            (0x04, payload)
        })
        .collect();
    adapter
        .serve_procedure(CLASS_ATTCLIENT, 0x03, &events, &[CONN, 0x00, 0x00, 0xFF, 0xFF])
        .await;
}

async fn serve_service_discovery(adapter: &mut FakeAdapter) {
    let mut row = vec![CONN];
    row.extend_from_slice(&SERVICE_START.to_le_bytes());
    row.extend_from_slice(&SERVICE_END.to_le_bytes());
    row.push(2);
    row.extend_from_slice(&0x180Fu16.to_le_bytes());
    adapter
        .serve_procedure(
            CLASS_ATTCLIENT,
            0x01,
            &[(0x02, row)],
            &[CONN, 0x00, 0x00, 0xFF, 0xFF],
        )
        .await;
}

async fn serve_characteristic_discovery(adapter: &mut FakeAdapter) {
    let declaration_row = |declaration: u16, props: u8, value: u16, uuid: u16| {
        let mut payload = vec![CONN];
        payload.extend_from_slice(&declaration.to_le_bytes());
        payload.push(0x03); // read-by-type row
        let mut data = vec![props];
        data.extend_from_slice(&value.to_le_bytes());
        data.extend_from_slice(&uuid.to_le_bytes());
        payload.push(data.len() as u8);
        payload.extend_from_slice(&data);
        (0x05, payload)
    };
    let rows = vec![
        declaration_row(0x0010, 0x1E, VALUE_HANDLE, 0x2A19),
        declaration_row(0x0014, 0x02, READONLY_VALUE, 0x2A20),
    ];
    adapter
        .serve_procedure(CLASS_ATTCLIENT, 0x02, &rows, &[CONN, 0x00, 0x00, 0xFF, 0xFF])
        .await;
}

/// Scan, connect and sweep descriptors; returns the connected device.
async fn connected_device() -> (
    Central,
    FakeAdapter,
    Arc<Device>,
    UnboundedReceiver<DelegateEvent>,
) {
    let (central, mut adapter) = open_central().await;
    let (delegate, mut rx) = RecordingDelegate::new();
    central.set_delegate(delegate);

    adapter
        .send_event(CLASS_GAP, 0x00, &scan_payload(&peripheral_address(), -55, 0x00, Some("beacon-7")))
        .await;
    assert_eq!(
        next_event(&mut rx).await,
        DelegateEvent::Found(peripheral_address())
    );
    let device = central.device(&peripheral_address()).unwrap();

    let (connected, ()) = tokio::join!(device.connect(), serve_connect(&mut adapter));
    connected.unwrap();
    assert_eq!(device.state(), bgble::DeviceState::DescriptorsDiscovered);
    (central, adapter, device, rx)
}

#[tokio::test]
async fn test_discovery_reports_found_then_updated() {
    let (central, mut adapter) = open_central().await;
    let (delegate, mut rx) = RecordingDelegate::new();
    central.set_delegate(delegate);

    let (started, ()) = tokio::join!(central.start_discovery(DiscoverMode::Generic), async {
        adapter.expect_command(CLASS_GAP, 0x02).await;
        adapter.respond(CLASS_GAP, 0x02, &[0x00, 0x00]).await;
    });
    started.unwrap();

    let address = peripheral_address();
    adapter
        .send_event(CLASS_GAP, 0x00, &scan_payload(&address, -60, 0x00, Some("beacon-7")))
        .await;
    assert_eq!(next_event(&mut rx).await, DelegateEvent::Found(address));

    adapter
        .send_event(CLASS_GAP, 0x00, &scan_payload(&address, -72, 0x00, None))
        .await;
    assert_eq!(next_event(&mut rx).await, DelegateEvent::Updated(address));

    let device = central.device(&address).unwrap();
    assert_eq!(device.name().as_deref(), Some("beacon-7"));
    assert_eq!(device.info().rssi, -72);
    assert_eq!(central.devices().len(), 1);
}

#[tokio::test]
async fn test_connect_discovers_services_and_characteristics() {
    let (_central, mut adapter, device, _rx) = connected_device().await;

    let (services, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = services.unwrap();
    assert_eq!(services.len(), 1);
    let service = &services[0];
    assert_eq!(service.uuid(), AttUuid::short(0x180F));
    assert_eq!((service.start(), service.end()), (SERVICE_START, SERVICE_END));

    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let characteristics = characteristics.unwrap();
    assert_eq!(characteristics.len(), 2);
    assert_eq!(characteristics[0].uuid(), AttUuid::short(0x2A19));
    assert_eq!(characteristics[0].value_handle(), VALUE_HANDLE);
    assert!(characteristics[0].properties().notify());
    assert!(!characteristics[1].properties().write());

    // Second call comes from the cache, no adapter traffic.
    let again = service.characteristics().await.unwrap();
    assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn test_read_returns_value_without_completion_event() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let battery = characteristics.unwrap().remove(0);

    let (value, ()) = tokio::join!(battery.read(), async {
        let payload = adapter.expect_command(CLASS_ATTCLIENT, 0x04).await;
        assert_eq!(payload, vec![CONN, 0x11, 0x00]);
        adapter
            .respond(CLASS_ATTCLIENT, 0x04, &[CONN, 0x00, 0x00])
            .await;
        // A plain read produces only the value event.
        adapter
            .send_event(CLASS_ATTCLIENT, 0x05, &[CONN, 0x11, 0x00, 0x00, 0x01, 0x63])
            .await;
    });
    assert_eq!(value.unwrap(), vec![0x63]);
}

#[tokio::test]
async fn test_long_read_stitches_blob_fragments_in_order() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let battery = characteristics.unwrap().remove(0);

    let expected: Vec<u8> = (0..50).collect();
    let fragments: Vec<(u8, Vec<u8>)> = expected
        .chunks(22)
        .map(|chunk| {
            let mut payload = vec![CONN, 0x11, 0x00, 0x04, chunk.len() as u8];
            payload.extend_from_slice(chunk);
            (0x05, payload)
        })
        .collect();

    let (value, _) = tokio::join!(battery.read_long(), async {
        adapter
            .serve_procedure(
                CLASS_ATTCLIENT,
                0x08,
                &fragments,
                &[CONN, 0x00, 0x00, 0x11, 0x00],
            )
            .await
    });
    assert_eq!(value.unwrap(), expected);
}

#[tokio::test]
async fn test_long_write_chunks_through_prepare_queue() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let battery = characteristics.unwrap().remove(0);

    let data: Vec<u8> = (0..45).collect();
    let (written, ()) = tokio::join!(battery.write(&data), async {
        for (offset, len) in [(0u16, 18usize), (18, 18), (36, 9)] {
            let payload = adapter
                .serve_procedure(CLASS_ATTCLIENT, 0x09, &[], &[CONN, 0x00, 0x00, 0x11, 0x00])
                .await;
            assert_eq!(payload[0], CONN);
            assert_eq!(u16::from_le_bytes([payload[1], payload[2]]), VALUE_HANDLE);
            assert_eq!(u16::from_le_bytes([payload[3], payload[4]]), offset);
            assert_eq!(payload[5] as usize, len);
            assert_eq!(&payload[6..], &data[offset as usize..offset as usize + len]);
        }
        let payload = adapter
            .serve_procedure(CLASS_ATTCLIENT, 0x0A, &[], &[CONN, 0x00, 0x00, 0x11, 0x00])
            .await;
        assert_eq!(payload, vec![CONN, 0x01]); // commit
    });
    written.unwrap();
}

#[tokio::test]
async fn test_failed_fragment_cancels_prepare_queue() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let battery = characteristics.unwrap().remove(0);

    let data: Vec<u8> = (0..45).collect();
    let (written, ()) = tokio::join!(battery.write(&data), async {
        adapter
            .serve_procedure(CLASS_ATTCLIENT, 0x09, &[], &[CONN, 0x00, 0x00, 0x11, 0x00])
            .await;
        // Second fragment is rejected outright.
        adapter.expect_command(CLASS_ATTCLIENT, 0x09).await;
        adapter
            .respond(CLASS_ATTCLIENT, 0x09, &[CONN, 0x07, 0x04])
            .await;
        // The host must drop the queue, not commit it.
        let payload = adapter
            .serve_procedure(CLASS_ATTCLIENT, 0x0A, &[], &[CONN, 0x00, 0x00, 0x11, 0x00])
            .await;
        assert_eq!(payload, vec![CONN, 0x00]); // cancel
    });
    assert_eq!(written, Err(GattError::Remote(ErrorCode(0x0407))));
}

#[tokio::test]
async fn test_unsupported_operation_fails_before_any_io() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let mut characteristics = characteristics.unwrap();
    let readonly = characteristics.remove(1);
    let battery = characteristics.remove(0);

    // No adapter servicing: the gate must fail before any command.
    assert!(matches!(
        readonly.write(b"nope").await,
        Err(GattError::Unsupported("write"))
    ));
    assert!(matches!(
        readonly.subscribe(Arc::new(|_| {})).await,
        Err(GattError::Unsupported(_))
    ));
    // Unacked writes cannot chunk; oversized values are refused, not cut.
    assert!(matches!(
        battery.write_unacked(&[0xAA; 30]).await,
        Err(GattError::ValueTooLong(30))
    ));
}

#[tokio::test]
async fn test_subscribe_routes_notifications_to_callback() {
    let (_central, mut adapter, device, _rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    let services = device.services().await.unwrap();
    let service = &services[0];
    let (characteristics, ()) = tokio::join!(
        service.characteristics(),
        serve_characteristic_discovery(&mut adapter)
    );
    let battery = characteristics.unwrap().remove(0);

    let (tx, mut values) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    let (subscribed, ()) = tokio::join!(
        battery.subscribe(Arc::new(move |data| {
            let _ = tx.send(data.to_vec());
        })),
        async {
            // Notifications are armed through the client configuration
            // descriptor next to the declaration.
            let payload = adapter.expect_command(CLASS_ATTCLIENT, 0x06).await;
            assert_eq!(u16::from_le_bytes([payload[1], payload[2]]), CCC_HANDLE);
            assert_eq!(&payload[4..], &[0x01, 0x00]);
            adapter
                .respond(CLASS_ATTCLIENT, 0x06, &[CONN, 0x00, 0x00])
                .await;
        }
    );
    subscribed.unwrap();

    adapter
        .send_event(CLASS_ATTCLIENT, 0x05, &[CONN, 0x11, 0x00, 0x01, 0x02, 0xAA, 0xBB])
        .await;
    let value = tokio::time::timeout(std::time::Duration::from_secs(5), values.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, vec![0xAA, 0xBB]);
}

#[tokio::test]
async fn test_disconnect_tears_down_and_notifies_delegate() {
    let (central, mut adapter, device, mut rx) = connected_device().await;
    let (_, ()) = tokio::join!(device.services(), serve_service_discovery(&mut adapter));
    assert_eq!(device.services().await.unwrap().len(), 1);

    let (disconnected, ()) = tokio::join!(device.disconnect(), async {
        adapter.expect_command(CLASS_CONNECTION, 0x00).await;
        adapter
            .respond(CLASS_CONNECTION, 0x00, &[CONN, 0x00, 0x00])
            .await;
        adapter
            .send_event(CLASS_CONNECTION, 0x04, &[CONN, 0x13, 0x02])
            .await;
    });
    disconnected.unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        DelegateEvent::Disconnected(peripheral_address(), 0x0213)
    );
    assert_eq!(device.state(), bgble::DeviceState::Disconnected);

    // GATT caches are gone; the record itself survives in the registry.
    assert!(central.device(&peripheral_address()).is_some());
    assert!(matches!(
        device.read_multiple(&[VALUE_HANDLE]).await,
        Err(GattError::NotConnected)
    ));
}
