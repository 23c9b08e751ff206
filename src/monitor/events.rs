//! Event publishing for monitor consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::watcher::GameEventInfo;

/// Name of an event consumers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// The client process exited.
    Exit,
    /// A log line was classified.
    GameEvent,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::GameEvent => "gameEvent",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum MonitorEvent {
    Exit,
    GameEvent(GameEventInfo),
}

impl MonitorEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Exit => EventKind::Exit,
            Self::GameEvent(_) => EventKind::GameEvent,
        }
    }
}

/// Identifies a registered handler for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;
type HandlerMap = HashMap<EventKind, Vec<(HandlerId, Handler)>>;

/// Synchronous pub/sub keyed by [`EventKind`].
///
/// Handlers run in registration order on the emitting task. Each emission
/// works on a snapshot of the handler list, so handlers may subscribe or
/// unsubscribe (themselves included) without affecting the current pass.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HandlerMap>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: &MonitorEvent) {
        let snapshot: Vec<Handler> = self
            .lock()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerMap> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("exit_handlers", &self.handler_count(EventKind::Exit))
            .field("game_event_handlers", &self.handler_count(EventKind::GameEvent))
            .finish()
    }
}
