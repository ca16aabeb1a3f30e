//! Weft Runtime
//!
//! The registry woven modules call into, plus what surrounds it:
//!
//! - [`EventRegistry`]: typed listener buckets, dispatch and meta-events
//! - [`CapabilityTable`] and [`FallbackRegistrar`]: registration for
//!   instances that were never woven
//! - [`EventHistory`]: a readable log built from the meta-events
//! - [`Host`]: runs the lifecycle hooks of a compiled module
//!
//! ```
//! use std::rc::Rc;
//! use weft_runtime::{Event, EventHistory, EventRegistry, Listener};
//!
//! #[derive(Debug)]
//! struct Ping;
//! impl Event for Ping {}
//!
//! struct Counter;
//! impl Listener<Ping> for Counter {
//!     fn on_event(&self, _: &Ping) {}
//! }
//!
//! let registry = EventRegistry::new();
//! let history = EventHistory::attach(&registry);
//! let counter = Rc::new(Counter);
//! registry.register::<Ping, _>(&counter);
//! registry.raise(Ping);
//! assert_eq!(history.logs().len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod capability;
pub mod diagnostics;
pub mod event;
pub mod fallback;
pub mod host;
pub mod instance;
pub mod registry;

pub use capability::{Capability, CapabilityTable, RegistrationFn, TypeIndex};
pub use diagnostics::{EventHistory, EventLog, EventLogKind, LogFilter};
pub use event::{
    Event, EventDispatched, EventType, Listener, ListenerInfo, ListenerKey, ListenerRegistered,
    ListenerUnregistered,
};
pub use fallback::{CapabilityRecord, FallbackRegistrar, RecordError};
pub use host::{runtime_module, Host, HostConfig, HostError, NativeFn};
pub use instance::{InstanceRef, Instances};
pub use registry::{EventRegistry, FrameGuard};
