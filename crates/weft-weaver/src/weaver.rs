//! The weaving pass
//!
//! A pass runs in two phases. Planning only reads: it finds the registry,
//! walks every type's ancestry and resolves base hooks. Applying then patches
//! a copy of the module, which replaces the original only if it verifies.
//! Any missing prerequisite leaves the module exactly as it was.

use std::path::Path;

use tracing::{debug, warn};
use weft_bytecode::{verify_module, MethodDef, MethodRef, Module, TypeRef};

use crate::config::WeaverConfig;
use crate::discovery::{base_constructor, discover, inherited_destructor};
use crate::error::{WeaveError, WeaveWarning};
use crate::hooks::{get_or_add_hook, inject_calls, LifecycleShape};
use crate::resolver::{DirectoryResolver, ModuleResolver, TypeLookup};
use crate::session::ModuleSession;

/// Outcome of a pass over one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaveStatus {
    /// Registry calls were injected and the module marked woven
    Woven,
    /// The artifact name is not a weaving target
    NotTargeted,
    /// The module was woven by an earlier pass
    AlreadyWoven,
    /// The registry or its entry points are missing
    MissingPrerequisite,
    /// The artifact could not be read, decoded, verified or written
    Failed,
}

/// A type that received registry calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WovenType {
    /// Type name
    pub name: String,
    /// Hook pair used
    pub shape: LifecycleShape,
    /// Event types registered, in injection order
    pub events: Vec<TypeRef>,
}

/// Result of weaving one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveReport {
    /// Module name (file stem when the module was never opened)
    pub module: String,
    /// Outcome
    pub status: WeaveStatus,
    /// Patched types, in definition order
    pub woven: Vec<WovenType>,
    /// Non-fatal problems
    pub warnings: Vec<WeaveWarning>,
}

impl WeaveReport {
    fn new(module: impl Into<String>, status: WeaveStatus) -> Self {
        Self {
            module: module.into(),
            status,
            woven: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Total number of injected register calls
    pub fn register_calls(&self) -> usize {
        self.woven.iter().map(|t| t.events.len()).sum()
    }
}

/// Generic registry entry points, declared relative to the woven module
#[derive(Debug, Clone)]
struct EntryPoints {
    register: MethodRef,
    unregister: MethodRef,
}

impl EntryPoints {
    fn for_event(&self, registers: bool, event: &TypeRef) -> MethodRef {
        let open = if registers {
            &self.register
        } else {
            &self.unregister
        };
        open.clone().instantiate(vec![event.clone()])
    }
}

/// Everything needed to patch one type
#[derive(Debug)]
struct TypePlan {
    index: usize,
    shape: LifecycleShape,
    events: Vec<TypeRef>,
    base_constructor: Option<MethodRef>,
    base_destructor: Option<MethodRef>,
}

/// Post-compile weaver
pub struct Weaver<R: ModuleResolver> {
    config: WeaverConfig,
    resolver: R,
}

impl Weaver<DirectoryResolver> {
    /// Weaver resolving referenced modules from the configured search dirs
    pub fn from_config(config: WeaverConfig) -> Self {
        let resolver = DirectoryResolver::new(config.search_dirs.clone());
        Self::new(config, resolver)
    }
}

impl<R: ModuleResolver> Weaver<R> {
    /// Create a weaver
    pub fn new(config: WeaverConfig, resolver: R) -> Self {
        Self { config, resolver }
    }

    /// The active configuration
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Pipeline entry point, called once per compiled artifact
    ///
    /// Never fails: artifact errors are reported as warnings.
    pub fn on_module_compiled(&self, path: &Path) -> WeaveReport {
        match self.weave_file(path) {
            Ok(report) => report,
            Err(e) => {
                let mut report = WeaveReport::new(file_stem(path), WeaveStatus::Failed);
                self.record(
                    &mut report,
                    WeaveWarning::ArtifactFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    },
                );
                report
            }
        }
    }

    /// Weave the artifact at `path` in place
    ///
    /// The artifact is rewritten only when the status is
    /// [`WeaveStatus::Woven`].
    pub fn weave_file(&self, path: &Path) -> Result<WeaveReport, WeaveError> {
        if !self.config.is_target(path) {
            debug!("{} is not a weaving target", path.display());
            return Ok(WeaveReport::new(file_stem(path), WeaveStatus::NotTargeted));
        }

        let mut session = ModuleSession::open(path)?;
        let report = self.weave_module(session.module_mut());
        if report.status == WeaveStatus::Woven {
            session.commit()?;
        }
        Ok(report)
    }

    /// Weave a decoded module
    ///
    /// On any status other than [`WeaveStatus::Woven`] the module is left
    /// unchanged.
    pub fn weave_module(&self, module: &mut Module) -> WeaveReport {
        let mut report = WeaveReport::new(module.name(), WeaveStatus::Woven);

        if module.is_woven() {
            debug!("{} already woven, skipping", module.name());
            report.status = WeaveStatus::AlreadyWoven;
            return report;
        }

        let plans = match self.plan(module, &mut report) {
            Ok(plans) => plans,
            Err(warning) => {
                self.record(&mut report, warning);
                report.status = WeaveStatus::MissingPrerequisite;
                return report;
            }
        };

        let (entry_points, plans) = plans;
        let mut patched = module.clone();
        for plan in plans {
            report.woven.push(self.apply(&mut patched, &entry_points, plan));
        }
        patched.mark_woven();

        if self.config.verify {
            if let Err(e) = verify_module(&patched) {
                self.record(&mut report, WeaveWarning::VerificationFailed(e.to_string()));
                report.status = WeaveStatus::Failed;
                report.woven.clear();
                return report;
            }
        }

        *module = patched;
        debug!(
            "wove {} type(s) in {}",
            report.woven.len(),
            report.module
        );
        report
    }

    fn record(&self, report: &mut WeaveReport, warning: WeaveWarning) {
        warn!("{}: {}", report.module, warning);
        report.warnings.push(warning);
    }

    fn plan(
        &self,
        module: &Module,
        report: &mut WeaveReport,
    ) -> Result<(EntryPoints, Vec<TypePlan>), WeaveWarning> {
        let lookup = TypeLookup::new(module, &self.resolver);
        let entry_points = self.find_entry_points(&lookup)?;

        let mut plans = Vec::new();
        for (index, ty) in module.types.iter().enumerate() {
            if ty.is_abstract() || ty.is_interface() {
                continue;
            }

            let found = discover(&lookup, &self.config, ty);
            if let Some(warning) = found.warning {
                self.record(report, warning);
            }
            if found.events.is_empty() {
                continue;
            }

            let (chain_ctor, chain_dtor) = match found.shape {
                LifecycleShape::Component => (None, None),
                LifecycleShape::Plain => {
                    let has_ctor = ty
                        .find_method(&self.config.hooks.construct, 0)
                        .is_some_and(|m| m.is_constructor());
                    let ctor = if has_ctor {
                        None
                    } else {
                        match base_constructor(&lookup, &self.config, ty) {
                            Ok(ctor) => ctor,
                            Err(warning) => {
                                self.record(report, warning);
                                continue;
                            }
                        }
                    };
                    (ctor, inherited_destructor(&lookup, &self.config, ty))
                }
            };

            plans.push(TypePlan {
                index,
                shape: found.shape,
                events: found.events,
                base_constructor: chain_ctor,
                base_destructor: chain_dtor,
            });
        }

        Ok((entry_points, plans))
    }

    fn find_entry_points<S: ModuleResolver>(
        &self,
        lookup: &TypeLookup<'_, S>,
    ) -> Result<EntryPoints, WeaveWarning> {
        let registry = &self.config.registry;
        let module = lookup.module();

        let (registry_ref, registry_def) = match module.find_type(&registry.type_name) {
            Some(def) => (TypeRef::local(&registry.type_name), def.clone()),
            None => module
                .references
                .iter()
                .filter(|r| r.name.starts_with(&registry.module_prefix))
                .find_map(|r| {
                    let referenced = lookup.resolve_module(&r.name).ok()?;
                    let def = referenced.find_type(&registry.type_name)?.clone();
                    Some((TypeRef::external(&r.name, &registry.type_name), def))
                })
                .ok_or_else(|| WeaveWarning::RegistryNotFound {
                    module: module.name().to_string(),
                    type_name: registry.type_name.clone(),
                })?,
        };

        let has = |name: &str| {
            registry_def
                .methods
                .iter()
                .any(|m: &MethodDef| is_entry_point(m, name))
        };
        if !has(&registry.register) || !has(&registry.unregister) {
            return Err(WeaveWarning::EntryPointsMissing {
                registry: registry.type_name.clone(),
                register: registry.register.clone(),
                unregister: registry.unregister.clone(),
            });
        }

        Ok(EntryPoints {
            register: MethodRef::new(registry_ref.clone(), registry.register.clone(), 1),
            unregister: MethodRef::new(registry_ref, registry.unregister.clone(), 1),
        })
    }

    fn apply(&self, module: &mut Module, entry_points: &EntryPoints, plan: TypePlan) -> WovenType {
        let hook_names = &self.config.hooks;

        for hook in plan.shape.hooks() {
            let name = hook.method_name(hook_names);
            let calls: Vec<_> = plan
                .events
                .iter()
                .map(|event| module.import_method(entry_points.for_event(hook.registers(), event)))
                .collect();

            let declared = module.types[plan.index]
                .methods
                .iter()
                .any(|m| m.name == name && m.params.is_empty() && !m.is_static());
            let chain = if declared {
                None
            } else {
                let base = if hook.registers() {
                    plan.base_constructor.clone()
                } else {
                    plan.base_destructor.clone()
                };
                base.map(|target| module.import_method(target))
            };

            let ty = &mut module.types[plan.index];
            let at = get_or_add_hook(ty, name, || hook.synthesize(name, chain));
            inject_calls(&mut ty.methods[at].body, &calls);
        }

        let ty = &module.types[plan.index];
        debug!(
            "wove {} ({}): {}",
            ty.name,
            plan.shape,
            plan.events
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        WovenType {
            name: ty.name.clone(),
            shape: plan.shape,
            events: plan.events,
        }
    }
}

fn is_entry_point(method: &MethodDef, name: &str) -> bool {
    method.name == name
        && method.generic_param_count == 1
        && method.params.len() == 1
        && method.is_public()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
