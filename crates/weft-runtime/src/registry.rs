//! The event registry
//!
//! Listeners are kept per event type in registration order and held weakly.
//! Dispatch runs synchronously on the caller's thread over a snapshot of the
//! bucket, so handlers may register or unregister listeners (themselves
//! included) while an event is being raised.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::event::{
    Event, EventDispatched, EventType, Listener, ListenerInfo, ListenerKey, ListenerRegistered,
    ListenerUnregistered,
};

/// Type-erased handler; returns `false` once the listener is gone
type Handler = Rc<dyn Fn(&dyn Any) -> bool>;

struct Entry {
    info: ListenerInfo,
    handler: Handler,
}

struct Bucket {
    event_type: EventType,
    entries: Vec<Entry>,
}

impl Bucket {
    /// Entries whose listener is still owned somewhere
    fn live(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.info.is_alive())
    }
}

/// Publish/subscribe registry keyed by event type
#[derive(Default)]
pub struct EventRegistry {
    buckets: RefCell<FxHashMap<TypeId, Bucket>>,
    frames: RefCell<Vec<String>>,
}

/// Pops its frame from the registry's origin trail on drop
#[must_use = "the frame is popped when the guard is dropped"]
pub struct FrameGuard<'a> {
    registry: &'a EventRegistry,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.registry.frames.borrow_mut().pop();
    }
}

impl EventRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` to the listeners of `E`
    ///
    /// Returns `false` if it was already registered. A successful
    /// registration raises [`ListenerRegistered`], which is not delivered to
    /// `listener` itself.
    pub fn register<E, L>(&self, listener: &Rc<L>) -> bool
    where
        E: Event,
        L: Listener<E>,
    {
        let info = ListenerInfo::new(listener);
        let event_type = EventType::of::<E>();
        {
            let mut buckets = self.buckets.borrow_mut();
            let bucket = buckets.entry(event_type.id()).or_insert_with(|| Bucket {
                event_type,
                entries: Vec::new(),
            });
            // Drop entries whose listener is gone.
            bucket.entries.retain(|e| e.info.is_alive());
            if bucket.entries.iter().any(|e| e.info.key == info.key) {
                return false;
            }

            let weak: Weak<L> = Rc::downgrade(listener);
            let handler: Handler = Rc::new(move |event: &dyn Any| match weak.upgrade() {
                Some(listener) => {
                    if let Some(event) = event.downcast_ref::<E>() {
                        listener.on_event(event);
                    }
                    true
                }
                None => false,
            });
            bucket.entries.push(Entry {
                info: info.clone(),
                handler,
            });
        }

        debug!("{} registered for {}", info.short_type_name(), event_type);
        let key = info.key;
        self.dispatch(
            ListenerRegistered {
                listener: info,
                event_type,
            },
            Some(key),
        );
        true
    }

    /// Remove `listener` from the listeners of `E`
    ///
    /// Returns `false` if it was not registered. A successful removal raises
    /// [`ListenerUnregistered`], which is not delivered to `listener` itself.
    pub fn unregister<E, L>(&self, listener: &Rc<L>) -> bool
    where
        E: Event,
        L: Listener<E>,
    {
        let key = ListenerKey::of(listener);
        let event_type = EventType::of::<E>();
        let removed = {
            let mut buckets = self.buckets.borrow_mut();
            let Some(bucket) = buckets.get_mut(&event_type.id()) else {
                return false;
            };
            let Some(at) = bucket.entries.iter().position(|e| e.info.key == key) else {
                return false;
            };
            let entry = bucket.entries.remove(at);
            if bucket.entries.is_empty() {
                buckets.remove(&event_type.id());
            }
            entry
        };

        debug!(
            "{} unregistered from {}",
            removed.info.short_type_name(),
            event_type
        );
        self.dispatch(
            ListenerUnregistered {
                listener: removed.info,
                event_type,
            },
            Some(key),
        );
        true
    }

    /// Deliver `event` to every listener of its type, in registration order
    ///
    /// Afterwards [`EventDispatched`] is raised, unless `event` is itself an
    /// `EventDispatched`. Raising an event nobody listens to does nothing.
    pub fn raise<E: Event>(&self, event: E) {
        self.dispatch(event, None);
    }

    fn dispatch<E: Event>(&self, event: E, exclude: Option<ListenerKey>) {
        let event_type = EventType::of::<E>();
        let snapshot: Vec<(ListenerInfo, Handler)> = {
            let buckets = self.buckets.borrow();
            let Some(bucket) = buckets.get(&event_type.id()) else {
                return;
            };
            bucket
                .entries
                .iter()
                .filter(|e| Some(e.info.key) != exclude)
                .map(|e| (e.info.clone(), Rc::clone(&e.handler)))
                .collect()
        };

        trace!("raising {} to {} listener(s)", event_type, snapshot.len());
        let mut dead = Vec::new();
        for (info, handler) in &snapshot {
            let _frame = self.enter(format!("{}.on_event", info.type_name));
            if !handler(&event as &dyn Any) {
                dead.push(info.key);
            }
        }
        if !dead.is_empty() {
            self.prune(event_type, &dead);
        }

        if event_type.is::<EventDispatched>() || !self.has_listeners::<EventDispatched>() {
            return;
        }
        let summary = format!("{:?}", event);
        self.dispatch(
            EventDispatched {
                event: Rc::new(event),
                event_type,
                summary,
                origin: self.origin(),
            },
            None,
        );
    }

    fn prune(&self, event_type: EventType, dead: &[ListenerKey]) {
        let mut buckets = self.buckets.borrow_mut();
        if let Some(bucket) = buckets.get_mut(&event_type.id()) {
            bucket
                .entries
                .retain(|e| !dead.contains(&e.info.key) || e.info.is_alive());
            trace!("pruned dead listener(s) of {}", event_type);
            if bucket.entries.is_empty() {
                buckets.remove(&event_type.id());
            }
        }
    }

    /// Push a frame onto the origin trail recorded with [`EventDispatched`]
    pub fn enter(&self, frame: impl Into<String>) -> FrameGuard<'_> {
        self.frames.borrow_mut().push(frame.into());
        FrameGuard { registry: self }
    }

    /// Current origin trail, outermost first
    pub fn origin(&self) -> Vec<String> {
        self.frames.borrow().clone()
    }

    /// Event types that currently have listeners, sorted by name
    ///
    /// Queries only report listeners that are still alive; dead entries are
    /// removed by the next dispatch or registration.
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self
            .buckets
            .borrow()
            .values()
            .filter(|b| b.live().next().is_some())
            .map(|b| b.event_type)
            .collect();
        types.sort_by_key(|t| t.name());
        types
    }

    /// Listeners of `event_type`, in registration order
    pub fn listeners(&self, event_type: EventType) -> Vec<ListenerInfo> {
        self.buckets
            .borrow()
            .get(&event_type.id())
            .map(|b| b.live().map(|e| e.info.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of listeners of `E`
    pub fn listener_count<E: Event>(&self) -> usize {
        self.buckets
            .borrow()
            .get(&TypeId::of::<E>())
            .map_or(0, |b| b.live().count())
    }

    /// Whether any listener is registered for `E`
    pub fn has_listeners<E: Event>(&self) -> bool {
        self.buckets
            .borrow()
            .get(&TypeId::of::<E>())
            .is_some_and(|b| b.live().next().is_some())
    }

    /// Whether `listener` is registered for `E`
    pub fn is_registered<E: Event, L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        let key = ListenerKey::of(listener);
        self.buckets
            .borrow()
            .get(&TypeId::of::<E>())
            .is_some_and(|b| b.live().any(|e| e.info.key == key))
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.borrow();
        let mut map = f.debug_map();
        for bucket in buckets.values() {
            map.entry(&bucket.event_type.name(), &bucket.entries.len());
        }
        map.finish()
    }
}
