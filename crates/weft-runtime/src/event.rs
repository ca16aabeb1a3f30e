//! Events, listeners and the registry's meta-events

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Marker for values that can be raised through the registry
///
/// Each concrete type is its own event identity.
pub trait Event: Any + fmt::Debug {}

/// Handles events of type `E`
pub trait Listener<E: Event>: 'static {
    /// Called synchronously for every raised `E`
    fn on_event(&self, event: &E);
}

/// Runtime identity of an event type
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// Identity of `E`
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    /// Type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified name, also used as the textual event id
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Name without its module path
    pub fn short_name(&self) -> &'static str {
        short_name(self.name)
    }

    /// Whether this is the identity of `E`
    pub fn is<E: Event>(&self) -> bool {
        self.id == TypeId::of::<E>()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

pub(crate) fn short_name(path: &'static str) -> &'static str {
    // Generic arguments may contain `::` themselves.
    let head = path.split('<').next().unwrap_or(path);
    match head.rfind("::") {
        Some(at) => &path[at + 2..],
        None => path,
    }
}

/// Identity of a listener instance, stable while the registry tracks it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerKey(usize);

impl ListenerKey {
    /// Key of a shared listener
    pub fn of<L: ?Sized>(listener: &Rc<L>) -> Self {
        Self(Rc::as_ptr(listener) as *const () as usize)
    }
}

/// Description of a registered listener
#[derive(Clone)]
pub struct ListenerInfo {
    pub(crate) key: ListenerKey,
    pub(crate) type_name: &'static str,
    pub(crate) handle: Weak<dyn Any>,
}

impl ListenerInfo {
    pub(crate) fn new<L: Any>(listener: &Rc<L>) -> Self {
        let strong: Rc<dyn Any> = listener.clone();
        Self {
            key: ListenerKey::of(listener),
            type_name: type_name::<L>(),
            handle: Rc::downgrade(&strong),
        }
    }

    /// Listener identity
    pub fn key(&self) -> ListenerKey {
        self.key
    }

    /// Fully qualified listener type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Listener type name without its module path
    pub fn short_type_name(&self) -> &'static str {
        short_name(self.type_name)
    }

    /// Whether the listener is still alive
    pub fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }

    /// Whether this describes `listener`
    pub fn is<L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        self.key == ListenerKey::of(listener)
    }

    /// The listener, if alive and of type `L`
    pub fn downcast<L: Any>(&self) -> Option<Rc<L>> {
        self.handle.upgrade()?.downcast::<L>().ok()
    }
}

impl fmt::Debug for ListenerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerInfo")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Raised after a listener joined an event type's bucket
#[derive(Debug, Clone)]
pub struct ListenerRegistered {
    /// The listener
    pub listener: ListenerInfo,
    /// The event type it registered for
    pub event_type: EventType,
}

impl Event for ListenerRegistered {}

/// Raised after a listener left an event type's bucket
#[derive(Debug, Clone)]
pub struct ListenerUnregistered {
    /// The listener
    pub listener: ListenerInfo,
    /// The event type it unregistered from
    pub event_type: EventType,
}

impl Event for ListenerUnregistered {}

/// Raised after every dispatch, except dispatches of itself
#[derive(Clone)]
pub struct EventDispatched {
    /// The dispatched event
    pub event: Rc<dyn Any>,
    /// Its type
    pub event_type: EventType,
    /// `Debug` rendering of the event
    pub summary: String,
    /// Frames active when the event was raised, outermost first
    pub origin: Vec<String>,
}

impl EventDispatched {
    /// The dispatched event, if it is an `E`
    pub fn event<E: Event>(&self) -> Option<&E> {
        self.event.downcast_ref::<E>()
    }

    /// Whether the dispatched event is one of the listener lifecycle events
    pub fn is_lifecycle(&self) -> bool {
        self.event_type.is::<ListenerRegistered>() || self.event_type.is::<ListenerUnregistered>()
    }
}

impl fmt::Debug for EventDispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatched")
            .field("event_type", &self.event_type)
            .field("summary", &self.summary)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Event for EventDispatched {}
