//! Handles to live listener instances

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::capability::TypeIndex;

/// Stable, serializable handle to an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceRef(pub u64);

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    ty: TypeIndex,
    object: Weak<dyn Any>,
}

/// Weak table of instances and their types
///
/// Handles are never reused. A handle whose object has been dropped, or
/// that was removed, no longer resolves.
#[derive(Default)]
pub struct Instances {
    next: u64,
    slots: FxHashMap<u64, Slot>,
}

impl Instances {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `object` as an instance of `ty`
    pub fn insert(&mut self, ty: TypeIndex, object: &Rc<dyn Any>) -> InstanceRef {
        self.next += 1;
        self.slots.insert(
            self.next,
            Slot {
                ty,
                object: Rc::downgrade(object),
            },
        );
        InstanceRef(self.next)
    }

    /// The instance and its type, if still alive
    pub fn get(&self, handle: InstanceRef) -> Option<(TypeIndex, Rc<dyn Any>)> {
        let slot = self.slots.get(&handle.0)?;
        Some((slot.ty, slot.object.upgrade()?))
    }

    /// Stop tracking an instance
    pub fn remove(&mut self, handle: InstanceRef) -> bool {
        self.slots.remove(&handle.0).is_some()
    }

    /// Number of tracked handles, dead or alive
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no handle is tracked
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Instances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instances")
            .field("next", &self.next)
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityTable;

    #[test]
    fn test_handles_resolve_while_alive() {
        let mut table = CapabilityTable::new();
        let ty = table.declare_type("game.Player", None);
        let mut instances = Instances::new();

        let object: Rc<dyn Any> = Rc::new(1u8);
        let handle = instances.insert(ty, &object);
        assert_eq!(instances.get(handle).map(|(t, _)| t), Some(ty));

        drop(object);
        assert!(instances.get(handle).is_none());
        assert!(instances.remove(handle));
        assert!(!instances.remove(handle));
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut table = CapabilityTable::new();
        let ty = table.declare_type("game.Player", None);
        let mut instances = Instances::new();
        let object: Rc<dyn Any> = Rc::new(());

        let first = instances.insert(ty, &object);
        instances.remove(first);
        let second = instances.insert(ty, &object);
        assert_ne!(first, second);
    }

    #[test]
    fn test_serializes_as_number() {
        assert_eq!(serde_json::to_string(&InstanceRef(7)).unwrap(), "7");
    }
}
