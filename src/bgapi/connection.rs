//! BGAPI link: one-in-flight command channel and hot-plug lifecycle.
//!
//! A [`Connection`] owns the transport halves, a reader task that
//! feeds the frame decoder, the single pending-command slot, and the
//! event dispatcher. The link moves through `Open` →
//! `AwaitingRestore` (adapter unplugged) → `Open` (re-attached, same
//! object, handler registrations intact) and terminally to `Closed`.

use super::dispatch::{EventDispatcher, EventPacket};
use super::frame::{encode_command, FrameDecoder, Packet, PacketKind, MAX_PAYLOAD_LEN};
use super::transport::{Transport, TransportIo};
use super::ProtocolError;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Link configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a command waits for its response.
    pub command_timeout: Duration,
    /// Reader buffer size in bytes.
    pub read_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            read_buffer: 4096,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.command_timeout.is_zero() {
            return Err(ProtocolError::InvalidConfig(
                "command_timeout must be non-zero".into(),
            ));
        }
        if self.read_buffer < 64 {
            return Err(ProtocolError::InvalidConfig(
                "read_buffer must be at least 64 bytes".into(),
            ));
        }
        Ok(())
    }
}

/// Where the link currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Open,
    /// Adapter unplugged; waiting for [`Connection::attach`].
    AwaitingRestore,
}

/// Broadcast to lifecycle subscribers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Detached,
    Restored,
    Closed,
}

struct PendingCommand {
    class_id: u8,
    command_id: u8,
    tx: oneshot::Sender<Result<Packet, ProtocolError>>,
}

type WriterHalf = WriteHalf<Box<dyn TransportIo>>;

/// A live BGAPI link to one adapter.
pub struct Connection {
    weak: Weak<Connection>,
    config: ConnectionConfig,
    identity: RwLock<String>,
    state: RwLock<LinkState>,
    pending: Mutex<Option<PendingCommand>>,
    writer: tokio::sync::Mutex<Option<WriterHalf>>,
    dispatcher: EventDispatcher,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Open the link over a transport and start the reader. Must be
    /// called within a tokio runtime.
    pub fn open(transport: Transport, config: ConnectionConfig) -> Result<Arc<Self>, ProtocolError> {
        config.validate()?;
        let (identity, read_half, write_half) = transport.into_parts();
        let (lifecycle, _) = broadcast::channel(16);
        let conn = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            identity: RwLock::new(identity),
            state: RwLock::new(LinkState::Open),
            pending: Mutex::new(None),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            dispatcher: EventDispatcher::new(),
            lifecycle,
            reader: Mutex::new(None),
        });
        conn.spawn_reader(read_half);
        info!(identity = %conn.identity(), "bgapi link open");
        Ok(conn)
    }

    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    pub fn identity(&self) -> String {
        self.identity.read().clone()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Send one command and wait for its response payload.
    ///
    /// Exactly one command may be in flight; a concurrent call fails
    /// with [`ProtocolError::Busy`] immediately, it is never queued.
    /// A timeout clears the slot so the next command can proceed.
    pub async fn send(
        &self,
        class_id: u8,
        command_id: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        self.ensure_open()?;

        let rx = {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(ProtocolError::Busy);
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(PendingCommand {
                class_id,
                command_id,
                tx,
            });
            rx
        };

        trace!(class_id, command_id, len = payload.len(), "command out");
        let frame = encode_command(class_id, command_id, payload);
        if let Err(err) = self.write_frame(&frame).await {
            self.pending.lock().take();
            return Err(err);
        }

        match tokio::time::timeout(self.config.command_timeout, rx).await {
            Ok(Ok(verdict)) => verdict.map(|packet| packet.payload),
            // Slot dropped without a verdict: the link was torn down.
            Ok(Err(_)) => Err(self.state_error()),
            Err(_) => {
                self.pending.lock().take();
                warn!(class_id, command_id, "command timed out");
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Write a command that provokes no response (system reset).
    pub async fn write_raw(
        &self,
        class_id: u8,
        command_id: u8,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        self.ensure_open()?;
        self.write_frame(&encode_command(class_id, command_id, payload))
            .await
    }

    /// Mark the adapter unplugged. The in-flight command (if any)
    /// fails with [`ProtocolError::AwaitingRestore`]; handler
    /// registrations are kept for the next [`attach`](Self::attach).
    pub fn detach(&self) {
        self.handle_link_loss("detached by host");
        self.abort_reader();
    }

    /// Re-attach after hot-plug. The same `Connection` continues;
    /// subscribers see [`LifecycleEvent::Restored`]. If the new
    /// transport reports a different identity it is accepted and the
    /// identity updated; port matching belongs to the host layer.
    pub async fn attach(&self, transport: Transport) -> Result<(), ProtocolError> {
        match self.state() {
            LinkState::Closed => return Err(ProtocolError::NotOpen),
            // Hot-swap: drop the dead transport first.
            LinkState::Open => self.detach(),
            LinkState::AwaitingRestore => {}
        }

        let (identity, read_half, write_half) = transport.into_parts();
        {
            let previous = self.identity.read().clone();
            if !previous.is_empty() && previous != identity {
                warn!(%previous, current = %identity, "adapter restored on a different transport");
            }
        }
        *self.identity.write() = identity;
        *self.writer.lock().await = Some(write_half);
        *self.state.write() = LinkState::Open;
        self.spawn_reader(read_half);
        info!(identity = %self.identity(), "bgapi link restored");
        let _ = self.lifecycle.send(LifecycleEvent::Restored);
        Ok(())
    }

    /// Close the link for good. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            if *state == LinkState::Closed {
                return;
            }
            *state = LinkState::Closed;
        }
        self.fail_pending(ProtocolError::NotOpen);
        self.abort_reader();
        self.dispatcher.clear_queues();
        self.writer.lock().await.take();
        info!("bgapi link closed");
        let _ = self.lifecycle.send(LifecycleEvent::Closed);
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        match self.state() {
            LinkState::Open => Ok(()),
            LinkState::AwaitingRestore => Err(ProtocolError::AwaitingRestore),
            LinkState::Closed => Err(ProtocolError::NotOpen),
        }
    }

    fn state_error(&self) -> ProtocolError {
        match self.state() {
            LinkState::AwaitingRestore => ProtocolError::AwaitingRestore,
            _ => ProtocolError::NotOpen,
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(self.state_error());
        };
        writer
            .write_all(frame)
            .await
            .map_err(|err| ProtocolError::Io(err.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|err| ProtocolError::Io(err.to_string()))
    }

    fn spawn_reader(&self, mut read_half: ReadHalf<Box<dyn TransportIo>>) {
        let weak = self.weak.clone();
        let buf_len = self.config.read_buffer;
        let handle = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = vec![0u8; buf_len];
            loop {
                let result = read_half.read(&mut buf).await;
                let Some(conn) = weak.upgrade() else { break };
                match result {
                    Ok(0) => {
                        conn.handle_link_loss("transport closed");
                        break;
                    }
                    Ok(n) => {
                        decoder.extend(&buf[..n]);
                        while let Some(packet) = decoder.next_packet() {
                            conn.route_packet(packet);
                        }
                    }
                    Err(err) => {
                        conn.handle_link_loss(&err.to_string());
                        break;
                    }
                }
            }
            trace!("bgapi reader stopped");
        });
        if let Some(previous) = self.reader.lock().replace(handle) {
            previous.abort();
        }
    }

    fn route_packet(&self, packet: Packet) {
        match packet.header.kind {
            PacketKind::Event => self.dispatcher.dispatch(EventPacket {
                class_id: packet.header.class_id,
                command_id: packet.header.command_id,
                payload: packet.payload,
            }),
            PacketKind::Response => {
                let slot = self.pending.lock().take();
                match slot {
                    Some(pending) => {
                        let verdict = if pending.class_id == packet.header.class_id
                            && pending.command_id == packet.header.command_id
                        {
                            Ok(packet)
                        } else {
                            Err(ProtocolError::ResponseMismatch {
                                sent_class: pending.class_id,
                                sent_command: pending.command_id,
                                received_class: packet.header.class_id,
                                received_command: packet.header.command_id,
                            })
                        };
                        let _ = pending.tx.send(verdict);
                    }
                    None => debug!(
                        class_id = packet.header.class_id,
                        command_id = packet.header.command_id,
                        "unsolicited response dropped"
                    ),
                }
            }
        }
    }

    fn handle_link_loss(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if *state != LinkState::Open {
                return;
            }
            *state = LinkState::AwaitingRestore;
        }
        warn!(reason, "adapter detached");
        self.fail_pending(ProtocolError::AwaitingRestore);
        self.dispatcher.clear_queues();
        let _ = self.lifecycle.send(LifecycleEvent::Detached);
    }

    fn fail_pending(&self, err: ProtocolError) {
        if let Some(pending) = self.pending.lock().take() {
            let _ = pending.tx.send(Err(err));
        }
    }

    fn abort_reader(&self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.abort_reader();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
