//! Activity history built from the registry's meta-events

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::event::{
    EventDispatched, Listener, ListenerKey, ListenerRegistered, ListenerUnregistered,
};
use crate::registry::EventRegistry;

/// Kind of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLogKind {
    /// A listener registered
    Register,
    /// An event was raised
    Raise,
    /// A listener unregistered
    Unregister,
}

impl fmt::Display for EventLogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => write!(f, "register"),
            Self::Raise => write!(f, "raise"),
            Self::Unregister => write!(f, "unregister"),
        }
    }
}

/// One line of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventLog {
    /// Human-readable description
    pub message: String,
    /// Entry kind
    pub kind: EventLogKind,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

/// Which kinds [`EventHistory::filtered_logs`] returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    /// Include registrations
    pub register: bool,
    /// Include raises
    pub raise: bool,
    /// Include unregistrations
    pub unregister: bool,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            register: true,
            raise: true,
            unregister: true,
        }
    }
}

impl LogFilter {
    /// Whether entries of `kind` pass
    pub fn allows(&self, kind: EventLogKind) -> bool {
        match kind {
            EventLogKind::Register => self.register,
            EventLogKind::Raise => self.raise,
            EventLogKind::Unregister => self.unregister,
        }
    }
}

/// Frames of this crate never appear in origin trails
const INTERNAL_FRAME_PREFIX: &str = "weft_runtime::";

/// Meta-event consumer that keeps a readable activity log
#[derive(Debug)]
pub struct EventHistory {
    logs: RefCell<Vec<EventLog>>,
    filter: Cell<LogFilter>,
    ignored_frames: Vec<String>,
    key: Cell<Option<ListenerKey>>,
}

impl EventHistory {
    /// Create a history and subscribe it to the three meta-events
    pub fn attach(registry: &EventRegistry) -> Rc<Self> {
        Self::attach_ignoring(registry, Vec::new())
    }

    /// Like [`attach`](Self::attach), also hiding origin frames that start
    /// with any of `ignored_frames`
    pub fn attach_ignoring(registry: &EventRegistry, ignored_frames: Vec<String>) -> Rc<Self> {
        let history = Rc::new(Self {
            logs: RefCell::new(Vec::new()),
            filter: Cell::new(LogFilter::default()),
            ignored_frames,
            key: Cell::new(None),
        });
        history.key.set(Some(ListenerKey::of(&history)));
        registry.register::<ListenerRegistered, _>(&history);
        registry.register::<EventDispatched, _>(&history);
        registry.register::<ListenerUnregistered, _>(&history);
        history
    }

    /// Unsubscribe from the registry
    pub fn detach(self: &Rc<Self>, registry: &EventRegistry) {
        registry.unregister::<ListenerRegistered, _>(self);
        registry.unregister::<EventDispatched, _>(self);
        registry.unregister::<ListenerUnregistered, _>(self);
    }

    /// Current kind filter
    pub fn filter(&self) -> LogFilter {
        self.filter.get()
    }

    /// Replace the kind filter
    pub fn set_filter(&self, filter: LogFilter) {
        self.filter.set(filter);
    }

    /// All entries, oldest first
    pub fn logs(&self) -> Vec<EventLog> {
        self.logs.borrow().clone()
    }

    /// Entries passing the current filter, oldest first
    pub fn filtered_logs(&self) -> Vec<EventLog> {
        let filter = self.filter.get();
        self.logs
            .borrow()
            .iter()
            .filter(|log| filter.allows(log.kind))
            .cloned()
            .collect()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.logs.borrow_mut().clear();
    }

    fn describes_me(&self, key: ListenerKey) -> bool {
        self.key.get() == Some(key)
    }

    fn add(&self, message: String, kind: EventLogKind) {
        debug!("[{}] {}", kind, message);
        self.logs.borrow_mut().push(EventLog {
            message,
            kind,
            timestamp: Utc::now(),
        });
    }

    fn origin_path(&self, origin: &[String]) -> String {
        origin
            .iter()
            .filter(|frame| {
                !frame.starts_with(INTERNAL_FRAME_PREFIX)
                    && !self.ignored_frames.iter().any(|p| frame.starts_with(p.as_str()))
            })
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl Listener<ListenerRegistered> for EventHistory {
    fn on_event(&self, event: &ListenerRegistered) {
        if self.describes_me(event.listener.key()) {
            return;
        }
        self.add(
            format!(
                "{} registered for {}",
                event.listener.short_type_name(),
                event.event_type
            ),
            EventLogKind::Register,
        );
    }
}

impl Listener<ListenerUnregistered> for EventHistory {
    fn on_event(&self, event: &ListenerUnregistered) {
        if self.describes_me(event.listener.key()) {
            return;
        }
        self.add(
            format!(
                "{} unregistered for {}",
                event.listener.short_type_name(),
                event.event_type
            ),
            EventLogKind::Unregister,
        );
    }
}

impl Listener<EventDispatched> for EventHistory {
    fn on_event(&self, event: &EventDispatched) {
        if event.is_lifecycle() {
            return;
        }
        let path = self.origin_path(&event.origin);
        let message = if path.is_empty() {
            format!("{} raised", event.event_type)
        } else {
            format!("{} raised by {}", event.event_type, path)
        };
        self.add(message, EventLogKind::Raise);
    }
}
