//! Registration for instances that were never woven
//!
//! A [`FallbackRegistrar`] is owned by whatever groups a set of instances
//! (an entity, a scene node). [`refresh`](FallbackRegistrar::refresh)
//! discovers their capabilities through the [`CapabilityTable`] and stores
//! one record per (instance, event type). The records serialize to JSON so a
//! saved group registers again without rediscovery.

use std::any::Any;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::capability::{Capability, CapabilityTable};
use crate::instance::{InstanceRef, Instances};
use crate::registry::EventRegistry;

/// Capability record persistence errors
#[derive(Debug, Error)]
pub enum RecordError {
    /// Failed to read or write the record file
    #[error("Failed to access capability records: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record JSON
    #[error("Failed to parse capability records: {0}")]
    Json(#[from] serde_json::Error),
}

/// One discovered (instance, event type) pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// The listening instance
    pub target: InstanceRef,
    /// Textual event id, resolved through the capability table
    pub event_type: String,
}

/// Drives registry calls from stored capability records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackRegistrar {
    records: Vec<CapabilityRecord>,
}

impl FallbackRegistrar {
    /// Registrar with no records
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrar over existing records
    pub fn from_records(records: Vec<CapabilityRecord>) -> Self {
        Self { records }
    }

    /// Stored records
    pub fn records(&self) -> &[CapabilityRecord] {
        &self.records
    }

    /// Rediscover the capabilities of `targets`, replacing all records
    ///
    /// Targets that no longer resolve are skipped.
    pub fn refresh(
        &mut self,
        table: &CapabilityTable,
        instances: &Instances,
        targets: &[InstanceRef],
    ) {
        self.records.clear();
        for &target in targets {
            let Some((ty, _)) = instances.get(target) else {
                trace!("skipping dead instance {}", target);
                continue;
            };
            self.records
                .extend(table.capabilities(ty).iter().map(|c| CapabilityRecord {
                    target,
                    event_type: c.event_type().name().to_string(),
                }));
        }
        debug!("discovered {} capability record(s)", self.records.len());
    }

    /// Register every record; returns how many registrations took effect
    pub fn register_all(
        &self,
        registry: &EventRegistry,
        table: &CapabilityTable,
        instances: &Instances,
    ) -> usize {
        self.drive(table, instances, |capability, instance| {
            capability.register(registry, instance)
        })
    }

    /// Unregister every record; returns how many removals took effect
    pub fn unregister_all(
        &self,
        registry: &EventRegistry,
        table: &CapabilityTable,
        instances: &Instances,
    ) -> usize {
        self.drive(table, instances, |capability, instance| {
            capability.unregister(registry, instance)
        })
    }

    fn drive(
        &self,
        table: &CapabilityTable,
        instances: &Instances,
        mut call: impl FnMut(&Capability, &Rc<dyn Any>) -> bool,
    ) -> usize {
        let mut changed = 0;
        for record in &self.records {
            let Some((ty, instance)) = instances.get(record.target) else {
                continue;
            };
            let Some(event_type) = table.event_type(&record.event_type) else {
                trace!("unknown event type {}", record.event_type);
                continue;
            };
            let Some(capability) = table.capability(ty, event_type) else {
                continue;
            };
            if call(capability, &instance) {
                changed += 1;
            }
        }
        changed
    }

    /// Records as JSON
    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Records from JSON
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the records to `path`
    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read records from `path`
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventType, Listener};
    use std::cell::Cell;

    #[derive(Debug)]
    struct Ping;
    impl Event for Ping {}

    #[derive(Debug)]
    struct Pong;
    impl Event for Pong {}

    #[derive(Default)]
    struct Widget {
        hits: Cell<u32>,
    }

    impl Listener<Ping> for Widget {
        fn on_event(&self, _: &Ping) {
            self.hits.set(self.hits.get() + 1);
        }
    }

    impl Listener<Pong> for Widget {
        fn on_event(&self, _: &Pong) {
            self.hits.set(self.hits.get() + 10);
        }
    }

    struct Fixture {
        table: CapabilityTable,
        instances: Instances,
        widget: Rc<Widget>,
        handle: InstanceRef,
    }

    fn fixture() -> Fixture {
        let mut table = CapabilityTable::new();
        let ty = table.declare_type("ui.Widget", None);
        table.declare_capability::<Widget, Ping>(ty);
        table.declare_capability::<Widget, Pong>(ty);

        let widget = Rc::new(Widget::default());
        let object: Rc<dyn Any> = widget.clone();
        let mut instances = Instances::new();
        let handle = instances.insert(ty, &object);
        Fixture {
            table,
            instances,
            widget,
            handle,
        }
    }

    #[test]
    fn test_refresh_then_register_and_unregister() {
        let f = fixture();
        let registry = EventRegistry::new();
        let mut registrar = FallbackRegistrar::new();
        registrar.refresh(&f.table, &f.instances, &[f.handle]);
        assert_eq!(registrar.records().len(), 2);

        assert_eq!(registrar.register_all(&registry, &f.table, &f.instances), 2);
        assert_eq!(registrar.register_all(&registry, &f.table, &f.instances), 0);
        registry.raise(Ping);
        registry.raise(Pong);
        assert_eq!(f.widget.hits.get(), 11);

        assert_eq!(registrar.unregister_all(&registry, &f.table, &f.instances), 2);
        assert!(registry.event_types().is_empty());
    }

    #[test]
    fn test_unknown_event_and_dead_target_are_skipped() {
        let f = fixture();
        let registry = EventRegistry::new();
        let registrar = FallbackRegistrar::from_records(vec![
            CapabilityRecord {
                target: f.handle,
                event_type: "no::such::Event".to_string(),
            },
            CapabilityRecord {
                target: InstanceRef(999),
                event_type: EventType::of::<Ping>().name().to_string(),
            },
            CapabilityRecord {
                target: f.handle,
                event_type: EventType::of::<Ping>().name().to_string(),
            },
        ]);

        assert_eq!(registrar.register_all(&registry, &f.table, &f.instances), 1);
        assert_eq!(registry.listener_count::<Ping>(), 1);
    }

    #[test]
    fn test_refresh_replaces_records_and_skips_dropped_instances() {
        let Fixture {
            table,
            instances,
            widget,
            handle,
        } = fixture();
        let mut registrar = FallbackRegistrar::new();
        registrar.refresh(&table, &instances, &[handle]);
        assert_eq!(registrar.records().len(), 2);

        drop(widget);
        registrar.refresh(&table, &instances, &[handle]);
        assert!(registrar.records().is_empty());
    }

    #[test]
    fn test_records_round_trip_through_disk() {
        let f = fixture();
        let mut registrar = FallbackRegistrar::new();
        registrar.refresh(&f.table, &f.instances, &[f.handle]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listeners.json");
        registrar.save(&path).unwrap();
        let loaded = FallbackRegistrar::load(&path).unwrap();
        assert_eq!(loaded, registrar);

        // Loaded records register without another refresh.
        let registry = EventRegistry::new();
        assert_eq!(loaded.register_all(&registry, &f.table, &f.instances), 2);
    }

    #[test]
    fn test_record_json_shape() {
        let json = FallbackRegistrar::from_records(vec![CapabilityRecord {
            target: InstanceRef(3),
            event_type: "game::Ping".to_string(),
        }])
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["target"], 3);
        assert_eq!(value[0]["event_type"], "game::Ping");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            FallbackRegistrar::from_json("{"),
            Err(RecordError::Json(_))
        ));
    }
}
