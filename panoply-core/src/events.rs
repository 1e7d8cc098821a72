//! Named lifecycle events and the publish/subscribe registry that carries them.
//!
//! Handlers are kept in registration order per event name. Handlers
//! subscribed under [`WILDCARD`] see every event before the name-specific
//! handlers do.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

use crate::uplink::{InboundResponse, OutboundRequest};

pub const WILDCARD: &str = "*";

/// Serialized as its event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Event {
    Send,
    Error,
    Flush,
    SourceState,
    Progress,
    SourceChange,
    Custom(String),
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::Send => "send",
            Event::Error => "error",
            Event::Flush => "flush",
            Event::SourceState => "source-state",
            Event::Progress => "progress",
            Event::SourceChange => "source-change",
            Event::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "send" => Event::Send,
            "error" => Event::Error,
            "flush" => Event::Flush,
            "source-state" => Event::SourceState,
            "progress" => Event::Progress,
            "source-change" => Event::SourceChange,
            custom => Event::Custom(custom.to_string()),
        }
    }

    pub fn all_standard() -> Vec<Self> {
        vec![
            Event::Send,
            Event::Error,
            Event::Flush,
            Event::SourceState,
            Event::Progress,
            Event::SourceChange,
        ]
    }
}

impl From<Event> for String {
    fn from(event: Event) -> Self {
        event.name().to_string()
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::from_name(&name)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Send {
        request: OutboundRequest,
    },
    Error {
        error_code: String,
        message: String,
        request: Option<OutboundRequest>,
    },
    Flush {
        request: OutboundRequest,
        response: InboundResponse,
    },
    SourceState(serde_json::Value),
    Progress {
        loaded: u64,
        total: u64,
        message: String,
    },
    SourceChange {
        field: String,
        value: serde_json::Value,
    },
    Custom(serde_json::Value),
}

impl EventPayload {
    /// The event this payload is published under.
    pub fn event(&self) -> Event {
        match self {
            EventPayload::Send { .. } => Event::Send,
            EventPayload::Error { .. } => Event::Error,
            EventPayload::Flush { .. } => Event::Flush,
            EventPayload::SourceState(_) => Event::SourceState,
            EventPayload::Progress { .. } => Event::Progress,
            EventPayload::SourceChange { .. } => Event::SourceChange,
            EventPayload::Custom(_) => Event::Custom("custom".to_string()),
        }
    }
}

/// Handler invoked with the event name and its payload.
pub type EventHandler = Arc<dyn Fn(&str, &EventPayload) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish/subscribe seam shared by the uplink, the token guard and data sources.
pub trait Emitter: Send + Sync {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    fn publish(&self, event: &str, payload: &EventPayload);

    fn emit(&self, payload: &EventPayload) {
        let event = payload.event();
        self.publish(event.name(), payload);
    }
}

pub type DynEmitter = Arc<dyn Emitter>;

struct RegisteredHandler {
    id: SubscriptionId,
    handler: EventHandler,
}

pub struct EventEmitter {
    handlers: RwLock<HashMap<String, Vec<RegisteredHandler>>>,
    next_id: AtomicU64,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Closure-friendly form of [`Emitter::subscribe`].
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &EventPayload) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(handler))
    }

    pub fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event).map(|h| h.len()).unwrap_or(0)
    }

    pub fn has_handlers(&self, event: &str) -> bool {
        self.handler_count(event) > 0
    }

    fn snapshot(&self, event: &str) -> Vec<EventHandler> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        if let Some(all) = handlers.get(WILDCARD) {
            out.extend(all.iter().map(|r| r.handler.clone()));
        }
        if event != WILDCARD {
            if let Some(named) = handlers.get(event) {
                out.extend(named.iter().map(|r| r.handler.clone()));
            }
        }
        out
    }
}

impl Emitter for EventEmitter {
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let registered = handlers.entry(event.to_string()).or_default();

        if let Some(existing) = registered
            .iter()
            .find(|r| Arc::ptr_eq(&r.handler, &handler))
        {
            debug!(event = %event, "Handler already subscribed");
            return existing.id;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        registered.push(RegisteredHandler { id, handler });

        debug!(event = %event, subscription = id.0, "Subscribed event handler");
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        for registered in handlers.values_mut() {
            let before = registered.len();
            registered.retain(|r| r.id != id);
            if registered.len() < before {
                return true;
            }
        }
        false
    }

    fn publish(&self, event: &str, payload: &EventPayload) {
        // handlers run outside the lock so they may subscribe or publish themselves
        let handlers = self.snapshot(event);
        trace!(event = %event, handlers = handlers.len(), "Publishing event");
        for handler in handlers {
            handler(event, payload);
        }
    }
}
