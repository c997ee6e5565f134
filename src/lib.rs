// bgble — BLE central driver for Bluegiga BGAPI adapters
//
// Talks the BGAPI binary protocol to a BLED112-class dongle over a
// serial-style byte stream: framing, one-in-flight command channel,
// ordered event dispatch, and a GATT central session layer on top.

pub mod bgapi;
pub mod central;
pub mod gatt;

pub use bgapi::connection::{Connection, ConnectionConfig, LifecycleEvent, LinkState};
pub use bgapi::transport::Transport;
pub use bgapi::ProtocolError;
pub use central::characteristic::{Characteristic, CharacteristicProperties};
pub use central::config::{CentralConfig, ConnectParameters, ScanParameters};
pub use central::device::{Device, DeviceState, Liveness};
pub use central::service::Service;
pub use central::{Central, CentralDelegate, GattError};
pub use gatt::types::{AttUuid, BdAddr, ErrorCode, ErrorGroup};
pub use gatt::{AddressType, DiscoverMode, ScanRecord};

/// Install the default `tracing` subscriber.
///
/// Filter comes from `RUST_LOG`, falling back to `info`. Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
