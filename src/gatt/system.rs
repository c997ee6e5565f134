//! System command class: adapter liveness, identity and reset.

use super::types::BdAddr;
use super::GattError;
use crate::bgapi::{Connection, CLASS_SYSTEM};
use std::sync::Arc;
use tracing::debug;

const CMD_RESET: u8 = 0x00;
const CMD_HELLO: u8 = 0x01;
const CMD_GET_ADDRESS: u8 = 0x02;
const CMD_GET_CONNECTIONS: u8 = 0x06;

/// Wrapper over the system class of the adapter.
#[derive(Clone)]
pub struct SystemCommands {
    connection: Arc<Connection>,
}

impl SystemCommands {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    /// Liveness ping; any response means the adapter is alive.
    pub async fn hello(&self) -> Result<(), GattError> {
        self.connection.send(CLASS_SYSTEM, CMD_HELLO, &[]).await?;
        Ok(())
    }

    /// The adapter's own Bluetooth address.
    pub async fn address(&self) -> Result<BdAddr, GattError> {
        let response = self
            .connection
            .send(CLASS_SYSTEM, CMD_GET_ADDRESS, &[])
            .await?;
        BdAddr::from_wire(&response).ok_or(GattError::TruncatedResponse)
    }

    /// How many simultaneous connections the adapter supports.
    pub async fn max_connections(&self) -> Result<u8, GattError> {
        let response = self
            .connection
            .send(CLASS_SYSTEM, CMD_GET_CONNECTIONS, &[])
            .await?;
        response.first().copied().ok_or(GattError::TruncatedResponse)
    }

    /// Reboot the adapter, optionally into DFU mode. The adapter sends
    /// no response to this command; the link will drop.
    pub async fn reset(&self, boot_to_dfu: bool) -> Result<(), GattError> {
        debug!(boot_to_dfu, "resetting adapter");
        self.connection
            .write_raw(CLASS_SYSTEM, CMD_RESET, &[u8::from(boot_to_dfu)])
            .await?;
        Ok(())
    }
}
