//! Weft Weaver
//!
//! Post-compile pass that wires event listeners automatically. For every type
//! in a compiled module that implements the listener interface for some event
//! types, the weaver injects calls to the event registry's generic
//! `register`/`unregister` entry points into the type's lifecycle hooks.
//!
//! ```no_run
//! use std::path::Path;
//! use weft_weaver::{Weaver, WeaverConfig};
//!
//! let config = WeaverConfig::from_file(Path::new("weft.toml")).unwrap_or_default();
//! let weaver = Weaver::from_config(config);
//! let report = weaver.on_module_compiled(Path::new("build/app.wbc"));
//! println!("{:?}: {} type(s) woven", report.status, report.woven.len());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod hooks;
pub mod resolver;
pub mod session;
pub mod weaver;

pub use config::{ConfigError, HookNames, RegistryConfig, WeaverConfig};
pub use error::{WeaveError, WeaveWarning};
pub use hooks::{HookKind, LifecycleShape};
pub use resolver::{DirectoryResolver, InMemoryResolver, ModuleResolver, ResolveError};
pub use session::ModuleSession;
pub use weaver::{WeaveReport, WeaveStatus, Weaver, WovenType};
