//! Runtime capability table
//!
//! Types are stored in an arena in declaration order; a parent must be
//! declared before its children. Every type carries the capabilities it
//! declares and its resolved set (own first, then inherited, one entry per
//! event type), recomputed whenever the table changes.
//!
//! A capability holds typed register/unregister closures created once for
//! its (listener type, event type) pair. Callers hand them a type-erased
//! instance; the closure downcasts it back to the concrete listener type.
//! Inherited entries keep the closures of the declaring type, so they apply
//! to subtypes backed by the same Rust type. A subtype with its own Rust
//! type declares the capability again, which shadows the inherited entry.

use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::event::{Event, EventType, Listener};
use crate::registry::EventRegistry;

/// Registers or unregisters one instance for one event type
///
/// Returns `false` when the instance is not of the declared listener type or
/// the registry state did not change.
pub type RegistrationFn = Rc<dyn Fn(&EventRegistry, &Rc<dyn Any>) -> bool>;

/// Index of a type in a [`CapabilityTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);

impl TypeIndex {
    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// A (listener type, event type) pairing with its bound closures
#[derive(Clone)]
pub struct Capability {
    event_type: EventType,
    listener_type: &'static str,
    register: RegistrationFn,
    unregister: RegistrationFn,
}

impl Capability {
    fn new<L, E>() -> Self
    where
        L: Listener<E>,
        E: Event,
    {
        let register: RegistrationFn =
            Rc::new(|registry: &EventRegistry, instance: &Rc<dyn Any>| {
                match Rc::clone(instance).downcast::<L>() {
                    Ok(listener) => registry.register::<E, L>(&listener),
                    Err(_) => false,
                }
            });
        let unregister: RegistrationFn =
            Rc::new(|registry: &EventRegistry, instance: &Rc<dyn Any>| {
                match Rc::clone(instance).downcast::<L>() {
                    Ok(listener) => registry.unregister::<E, L>(&listener),
                    Err(_) => false,
                }
            });
        Self {
            event_type: EventType::of::<E>(),
            listener_type: type_name::<L>(),
            register,
            unregister,
        }
    }

    /// Event type handled
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Listener type the closures expect
    pub fn listener_type(&self) -> &'static str {
        self.listener_type
    }

    /// Register `instance` for this capability's event type
    pub fn register(&self, registry: &EventRegistry, instance: &Rc<dyn Any>) -> bool {
        (self.register)(registry, instance)
    }

    /// Unregister `instance` from this capability's event type
    pub fn unregister(&self, registry: &EventRegistry, instance: &Rc<dyn Any>) -> bool {
        (self.unregister)(registry, instance)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("event_type", &self.event_type)
            .field("listener_type", &self.listener_type)
            .finish()
    }
}

#[derive(Debug)]
struct TypeRecord {
    name: String,
    parent: Option<TypeIndex>,
    declared: Vec<Capability>,
    resolved: Vec<Capability>,
}

/// Arena of types and their listener capabilities
#[derive(Debug, Default)]
pub struct CapabilityTable {
    types: Vec<TypeRecord>,
    by_name: FxHashMap<String, TypeIndex>,
    events: FxHashMap<String, EventType>,
}

impl CapabilityTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type, or return the existing index of `name`
    pub fn declare_type(
        &mut self,
        name: impl Into<String>,
        parent: Option<TypeIndex>,
    ) -> TypeIndex {
        let name = name.into();
        if let Some(&index) = self.by_name.get(&name) {
            return index;
        }
        let index = TypeIndex(self.types.len() as u32);
        let inherited = parent
            .and_then(|p| self.types.get(p.slot()))
            .map(|p| p.resolved.clone())
            .unwrap_or_default();
        self.types.push(TypeRecord {
            name: name.clone(),
            parent: parent.filter(|p| p.slot() < index.slot()),
            declared: Vec::new(),
            resolved: inherited,
        });
        self.by_name.insert(name, index);
        index
    }

    /// Make `E` resolvable by its fully qualified name and by `alias`
    ///
    /// Compiled modules name events by their module-level type name, which
    /// differs from the Rust path.
    pub fn declare_event<E: Event>(&mut self, alias: impl Into<String>) -> EventType {
        let event_type = EventType::of::<E>();
        self.events.insert(event_type.name().to_string(), event_type);
        self.events.insert(alias.into(), event_type);
        event_type
    }

    /// Declare that instances of `ty` (concretely `L`) handle `E`
    pub fn declare_capability<L, E>(&mut self, ty: TypeIndex)
    where
        L: Listener<E>,
        E: Event,
    {
        let Some(record) = self.types.get_mut(ty.slot()) else {
            return;
        };
        let capability = Capability::new::<L, E>();
        if record
            .declared
            .iter()
            .any(|c| c.event_type == capability.event_type)
        {
            return;
        }
        debug!("{} declares {}", record.name, capability.event_type);
        record.declared.push(capability);

        let event_type = EventType::of::<E>();
        self.events
            .entry(event_type.name().to_string())
            .or_insert(event_type);
        self.resolve_from(ty);
    }

    fn resolve_from(&mut self, start: TypeIndex) {
        // Children always follow their parents in the arena.
        for slot in start.slot()..self.types.len() {
            let mut resolved = self.types[slot].declared.clone();
            if let Some(parent) = self.types[slot].parent {
                for inherited in &self.types[parent.slot()].resolved {
                    if !resolved.iter().any(|c| c.event_type == inherited.event_type) {
                        resolved.push(inherited.clone());
                    }
                }
            }
            self.types[slot].resolved = resolved;
        }
    }

    /// Index of a declared type
    pub fn type_index(&self, name: &str) -> Option<TypeIndex> {
        self.by_name.get(name).copied()
    }

    /// Name of a declared type
    pub fn type_name(&self, ty: TypeIndex) -> Option<&str> {
        self.types.get(ty.slot()).map(|t| t.name.as_str())
    }

    /// Parent of a declared type
    pub fn parent(&self, ty: TypeIndex) -> Option<TypeIndex> {
        self.types.get(ty.slot()).and_then(|t| t.parent)
    }

    /// Resolve a textual event id
    pub fn event_type(&self, name: &str) -> Option<EventType> {
        self.events.get(name).copied()
    }

    /// Full capability set of `ty`: own first, then inherited
    pub fn capabilities(&self, ty: TypeIndex) -> &[Capability] {
        self.types
            .get(ty.slot())
            .map(|t| t.resolved.as_slice())
            .unwrap_or(&[])
    }

    /// Capability of `ty` for `event_type`, own or inherited
    pub fn capability(&self, ty: TypeIndex, event_type: EventType) -> Option<&Capability> {
        self.capabilities(ty)
            .iter()
            .find(|c| c.event_type == event_type)
    }

    /// Number of declared types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type has been declared
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
