//! Ordered event dispatch.
//!
//! Handlers register per key: exact `(class, id)` or wildcard over a
//! class. Each key gets one FIFO queue and one lazily spawned consumer
//! task, so events for a key are handled strictly in arrival order
//! while different keys proceed independently. Consumers block on the
//! queue; there is no polling.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Routing key for adapter events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub class_id: u8,
    /// `None` matches every event of the class. An exact registration
    /// always wins over the class wildcard.
    pub command_id: Option<u8>,
}

impl EventKey {
    pub fn exact(class_id: u8, command_id: u8) -> Self {
        Self {
            class_id,
            command_id: Some(command_id),
        }
    }

    pub fn class(class_id: u8) -> Self {
        Self {
            class_id,
            command_id: None,
        }
    }
}

/// An adapter event as routed to handlers.
#[derive(Debug, Clone)]
pub struct EventPacket {
    pub class_id: u8,
    pub command_id: u8,
    pub payload: Vec<u8>,
}

pub type EventHandler = Arc<dyn Fn(EventPacket) + Send + Sync>;

#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<EventKey, EventHandler>>,
    queues: Mutex<HashMap<EventKey, mpsc::UnboundedSender<EventPacket>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a key, replacing any previous one.
    /// Registrations survive link loss; the consumer respawns on the
    /// first matching event after restore.
    pub fn register<F>(&self, key: EventKey, handler: F)
    where
        F: Fn(EventPacket) + Send + Sync + 'static,
    {
        self.handlers.write().insert(key, Arc::new(handler));
        // A live consumer captured the old handler at spawn; drop its
        // queue so the next event respawns one with the new handler.
        self.queues.lock().remove(&key);
    }

    pub fn unregister(&self, key: EventKey) {
        self.handlers.write().remove(&key);
        self.queues.lock().remove(&key);
    }

    /// Route one event. Must run inside a tokio runtime (consumers are
    /// spawned tasks).
    pub fn dispatch(&self, event: EventPacket) {
        let exact = EventKey::exact(event.class_id, event.command_id);
        let wildcard = EventKey::class(event.class_id);
        let (key, handler) = {
            let handlers = self.handlers.read();
            if let Some(handler) = handlers.get(&exact) {
                (exact, handler.clone())
            } else if let Some(handler) = handlers.get(&wildcard) {
                (wildcard, handler.clone())
            } else {
                trace!(
                    class_id = event.class_id,
                    command_id = event.command_id,
                    "event without handler dropped"
                );
                return;
            }
        };

        let mut queues = self.queues.lock();
        let sender = queues
            .entry(key)
            .or_insert_with(|| spawn_consumer(key, handler.clone()));
        if let Err(mpsc::error::SendError(event)) = sender.send(event) {
            // Consumer ended (queues were cleared on link loss); respawn.
            *sender = spawn_consumer(key, handler);
            let _ = sender.send(event);
        }
    }

    /// Drop every queue. Consumers finish what is already queued and
    /// stop; handler registrations stay.
    pub fn clear_queues(&self) {
        self.queues.lock().clear();
    }
}

fn spawn_consumer(key: EventKey, handler: EventHandler) -> mpsc::UnboundedSender<EventPacket> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EventPacket>();
    tokio::spawn(async move {
        trace!(?key, "event consumer started");
        while let Some(event) = rx.recv().await {
            handler(event);
        }
        trace!(?key, "event consumer stopped");
    });
    tx
}
