//! Minimal host for compiled modules
//!
//! The host instantiates module types through bound factories and runs their
//! lifecycle hooks. Injected `register<E>`/`unregister<E>` calls are routed
//! to the capability table; `call.native` reaches bound Rust functions. Calls
//! to methods of types outside the module (host base types) are no-ops.

use std::any::Any;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{trace, warn};
use weft_bytecode::{
    method_attrs, type_attrs, Instruction, MethodDef, Module, Param, TypeDef, TypeRef,
};

use crate::capability::{CapabilityTable, TypeIndex};
use crate::event::{Event, Listener};
use crate::instance::{InstanceRef, Instances};
use crate::registry::EventRegistry;

/// Maximum nesting of method calls
const MAX_CALL_DEPTH: usize = 256;

/// Host errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The module does not define the type
    #[error("unknown type {0}")]
    UnknownType(String),

    /// No factory is bound for the type or any ancestor
    #[error("no factory bound for {0}")]
    NoFactory(String),

    /// The handle does not name a live instance
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceRef),

    /// `call.native` names an unbound function
    #[error("native function {0} is not bound")]
    UnboundNative(String),

    /// An injected registry call names an unbound event type
    #[error("event type {0} is not bound")]
    UnknownEvent(String),

    /// The instance's type has no capability for the event
    #[error("{ty} has no listener capability for {event}")]
    MissingCapability {
        /// Instance type
        ty: String,
        /// Event type
        event: String,
    },

    /// An operand indexes outside its table
    #[error("{method}: invalid operand at instruction {at}")]
    InvalidOperand {
        /// Executing method
        method: String,
        /// Instruction position
        at: usize,
    },

    /// Pop from an empty operand stack
    #[error("{method}: operand stack underflow at instruction {at}")]
    StackUnderflow {
        /// Executing method
        method: String,
        /// Instruction position
        at: usize,
    },

    /// A call received something other than the instance as receiver
    #[error("{method}: invalid receiver at instruction {at}")]
    InvalidReceiver {
        /// Executing method
        method: String,
        /// Instruction position
        at: usize,
    },

    /// The instruction is not supported in hooks
    #[error("{method}: unsupported instruction {instruction}")]
    Unsupported {
        /// Executing method
        method: String,
        /// Rendered instruction
        instruction: String,
    },

    /// Executed a `trap`
    #[error("{0}: trap")]
    Trap(String),

    /// Calls nested too deeply
    #[error("call depth exceeded in {0}")]
    CallDepthExceeded(String),
}

/// Names the host recognizes in compiled modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Name of the runtime module
    pub runtime_module: String,
    /// Registry type name
    pub registry_type: String,
    /// Generic registration entry point
    pub register: String,
    /// Generic unregistration entry point
    pub unregister: String,
    /// Listener interface name
    pub listener_interface: String,
    /// Construction hook
    pub construct: String,
    /// Destruction hook
    pub destruct: String,
    /// Activation hook
    pub activate: String,
    /// Deactivation hook
    pub deactivate: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_module: "weft".to_string(),
            registry_type: "weft.EventRegistry".to_string(),
            register: "register".to_string(),
            unregister: "unregister".to_string(),
            listener_interface: "weft.Listener".to_string(),
            construct: ".ctor".to_string(),
            destruct: "finalize".to_string(),
            activate: "on_enable".to_string(),
            deactivate: "on_disable".to_string(),
        }
    }
}

/// Compiled description of the runtime module
///
/// Weaving resolves the registry and its entry points against this module.
pub fn runtime_module(config: &HostConfig) -> Module {
    let entry_point = |name: &str| {
        MethodDef::new(name, method_attrs::PUBLIC | method_attrs::STATIC)
            .with_generic_params(1)
            .with_param(Param::new("listener", TypeRef::local("E")))
            .with_body(vec![Instruction::Return])
    };

    let mut module = Module::new(config.runtime_module.clone());
    module.add_type(
        TypeDef::new(config.registry_type.clone())
            .with_attributes(type_attrs::SEALED)
            .with_method(entry_point(&config.register))
            .with_method(entry_point(&config.unregister)),
    );
    module.add_type(
        TypeDef::new(config.listener_interface.clone())
            .with_attributes(type_attrs::INTERFACE)
            .with_generic_params(1)
            .with_method(
                MethodDef::new(
                    "on_event",
                    method_attrs::PUBLIC | method_attrs::VIRTUAL | method_attrs::ABSTRACT,
                )
                .with_param(Param::new("event", TypeRef::local("E"))),
            ),
    );
    module
}

/// Bound Rust function reachable through `call.native`
pub type NativeFn = Rc<dyn Fn(&Rc<dyn Any>)>;

type Factory = Box<dyn Fn() -> Rc<dyn Any>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Instance,
    Other,
}

/// Runs lifecycle hooks of a compiled module
pub struct Host {
    module: Module,
    config: HostConfig,
    registry: Rc<EventRegistry>,
    table: CapabilityTable,
    instances: Instances,
    live: FxHashMap<InstanceRef, Rc<dyn Any>>,
    factories: FxHashMap<String, Factory>,
    natives: FxHashMap<String, NativeFn>,
}

impl Host {
    /// Host with the default configuration
    pub fn new(module: Module, registry: Rc<EventRegistry>) -> Self {
        Self::with_config(module, registry, HostConfig::default())
    }

    /// Host over `module`; every module type is declared in the capability
    /// table, parents first
    pub fn with_config(module: Module, registry: Rc<EventRegistry>, config: HostConfig) -> Self {
        let mut table = CapabilityTable::new();
        for index in 0..module.types.len() {
            declare_with_ancestors(&module, &mut table, index, 0);
        }
        Self {
            module,
            config,
            registry,
            table,
            instances: Instances::new(),
            live: FxHashMap::default(),
            factories: FxHashMap::default(),
            natives: FxHashMap::default(),
        }
    }

    /// The hosted module
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The registry injected calls go to
    pub fn registry(&self) -> &Rc<EventRegistry> {
        &self.registry
    }

    /// Capability table of the module types
    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Live instance handles
    pub fn instances(&self) -> &Instances {
        &self.instances
    }

    /// Bind the Rust type backing module type `name` (and its subtypes
    /// without a factory of their own)
    pub fn bind_type<T: Any>(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> T + 'static,
    ) {
        self.factories.insert(
            name.into(),
            Box::new(move || Rc::new(factory()) as Rc<dyn Any>),
        );
    }

    /// Bind event type `E` to its module-level name
    pub fn bind_event<E: Event>(&mut self, name: impl Into<String>) {
        self.table.declare_event::<E>(name);
    }

    /// Declare that module type `name`, backed by `L`, handles `E`
    pub fn bind_capability<L, E>(&mut self, name: &str) -> Result<(), HostError>
    where
        L: Listener<E>,
        E: Event,
    {
        let ty = self
            .table
            .type_index(name)
            .ok_or_else(|| HostError::UnknownType(name.to_string()))?;
        self.table.declare_capability::<L, E>(ty);
        Ok(())
    }

    /// Bind a native function
    pub fn bind_native(
        &mut self,
        name: impl Into<String>,
        native: impl Fn(&Rc<dyn Any>) + 'static,
    ) {
        self.natives.insert(name.into(), Rc::new(native));
    }

    /// Create an instance of `type_name` and run its constructor
    pub fn instantiate(&mut self, type_name: &str) -> Result<InstanceRef, HostError> {
        let ty = self
            .table
            .type_index(type_name)
            .ok_or_else(|| HostError::UnknownType(type_name.to_string()))?;
        let object = self.create(ty, type_name)?;
        let handle = self.instances.insert(ty, &object);
        self.live.insert(handle, Rc::clone(&object));

        let ctor = self.module.find_type(type_name).and_then(|def| {
            def.find_method(&self.config.construct, 0)
                .filter(|m| m.is_constructor())
                .map(|m| (def, m))
        });
        if let Some((def, method)) = ctor {
            self.execute(ty, &object, def, method, 0)?;
        }
        Ok(handle)
    }

    /// The object behind a handle
    pub fn object(&self, handle: InstanceRef) -> Option<Rc<dyn Any>> {
        self.live.get(&handle).cloned()
    }

    /// The object behind a handle as its concrete type
    pub fn get<T: Any>(&self, handle: InstanceRef) -> Option<Rc<T>> {
        self.object(handle)?.downcast::<T>().ok()
    }

    /// Run the activation hook
    pub fn activate(&self, handle: InstanceRef) -> Result<(), HostError> {
        self.invoke(handle, &self.config.activate)
    }

    /// Run the deactivation hook
    pub fn deactivate(&self, handle: InstanceRef) -> Result<(), HostError> {
        self.invoke(handle, &self.config.deactivate)
    }

    /// Run the destruction hook and release the instance
    pub fn destroy(&mut self, handle: InstanceRef) -> Result<(), HostError> {
        let result = self.invoke(handle, &self.config.destruct);
        self.live.remove(&handle);
        self.instances.remove(handle);
        result
    }

    /// Run the zero-argument method `name` of an instance, looked up from
    /// its type upward; a missing method is a no-op
    pub fn invoke(&self, handle: InstanceRef, name: &str) -> Result<(), HostError> {
        let (ty, object) = self
            .instances
            .get(handle)
            .ok_or(HostError::UnknownInstance(handle))?;
        let type_name = self.table.type_name(ty).unwrap_or_default();
        match self.lookup(type_name, name, 0) {
            Some((def, method)) => self.execute(ty, &object, def, method, 0),
            None => Ok(()),
        }
    }

    fn create(&self, ty: TypeIndex, type_name: &str) -> Result<Rc<dyn Any>, HostError> {
        let mut current = Some(ty);
        while let Some(index) = current {
            if let Some(factory) = self
                .table
                .type_name(index)
                .and_then(|name| self.factories.get(name))
            {
                return Ok(factory());
            }
            current = self.table.parent(index);
        }
        Err(HostError::NoFactory(type_name.to_string()))
    }

    /// Find `name/param_count` on `type_name` or its ancestors in the module
    fn lookup(
        &self,
        type_name: &str,
        name: &str,
        param_count: usize,
    ) -> Option<(&TypeDef, &MethodDef)> {
        let mut current = self.module.find_type(type_name);
        let mut depth = 0;
        while let Some(def) = current {
            if let Some(method) = def.find_method(name, param_count) {
                return Some((def, method));
            }
            depth += 1;
            if depth > self.module.types.len() {
                return None;
            }
            current = def
                .base
                .as_ref()
                .filter(|base| self.is_local(base))
                .and_then(|base| self.module.find_type(base.name()));
        }
        None
    }

    fn is_local(&self, ty: &TypeRef) -> bool {
        ty.module().map_or(true, |m| m == self.module.name())
    }

    fn execute(
        &self,
        ty: TypeIndex,
        object: &Rc<dyn Any>,
        def: &TypeDef,
        method: &MethodDef,
        depth: usize,
    ) -> Result<(), HostError> {
        let qualified = format!("{}.{}", def.name, method.name);
        if depth >= MAX_CALL_DEPTH {
            return Err(HostError::CallDepthExceeded(qualified));
        }
        let _frame = self.registry.enter(qualified.clone());
        trace!("executing {}", qualified);

        let mut stack: Vec<Value> = Vec::new();
        for (at, instr) in method.body.iter().enumerate() {
            let underflow = || HostError::StackUnderflow {
                method: qualified.clone(),
                at,
            };
            let invalid = || HostError::InvalidOperand {
                method: qualified.clone(),
                at,
            };

            match *instr {
                Instruction::Nop => {}
                Instruction::Pop => {
                    stack.pop().ok_or_else(underflow)?;
                }
                Instruction::Dup => {
                    let top = stack.last().cloned().ok_or_else(underflow)?;
                    stack.push(top);
                }
                Instruction::LoadSelf => stack.push(Value::Instance),
                Instruction::LoadStr(index) => {
                    self.module.constants.get_string(index).ok_or_else(invalid)?;
                    stack.push(Value::Other);
                }
                Instruction::LoadNull => stack.push(Value::Other),
                Instruction::Call(id) | Instruction::CallVirt(id) => {
                    let target = self.module.method_ref(id).ok_or_else(invalid)?;
                    let argc = target.param_count as usize;
                    let declaring = target.declaring_type.name();
                    let registers = target.name == self.config.register;
                    let is_registration = declaring == self.config.registry_type
                        && (registers || target.name == self.config.unregister);

                    // Registry entry points are static; the listener is the argument.
                    let popped = if is_registration { argc } else { argc + 1 };
                    if stack.len() < popped {
                        return Err(underflow());
                    }
                    let operands = stack.split_off(stack.len() - popped);
                    if operands.first() != Some(&Value::Instance) {
                        return Err(HostError::InvalidReceiver {
                            method: qualified.clone(),
                            at,
                        });
                    }

                    if is_registration {
                        let [event] = target.generic_args.as_slice() else {
                            return Err(invalid());
                        };
                        // A listener that cannot be wired stays unregistered; the hook goes on.
                        if let Err(e) =
                            self.route_registration(ty, object, event.name(), registers)
                        {
                            warn!("{}: {}", qualified, e);
                        }
                    } else if !self.is_local(&target.declaring_type) {
                        trace!("{}: host call {} ignored", qualified, target);
                    } else if let Some((callee_def, callee)) =
                        self.lookup(declaring, &target.name, argc)
                    {
                        self.execute(ty, object, callee_def, callee, depth + 1)?;
                    } else {
                        trace!("{}: {} not defined in module", qualified, target);
                    }
                }
                Instruction::CallNative(index) => {
                    let name = self.module.constants.get_string(index).ok_or_else(invalid)?;
                    let native = self
                        .natives
                        .get(name)
                        .cloned()
                        .ok_or_else(|| HostError::UnboundNative(name.to_string()))?;
                    native(object);
                }
                Instruction::Return => return Ok(()),
                Instruction::Trap => return Err(HostError::Trap(qualified.clone())),
                Instruction::LoadArg(_) => {
                    return Err(HostError::Unsupported {
                        method: qualified.clone(),
                        instruction: instr.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn route_registration(
        &self,
        ty: TypeIndex,
        object: &Rc<dyn Any>,
        event_name: &str,
        register: bool,
    ) -> Result<(), HostError> {
        let event_type = self
            .table
            .event_type(event_name)
            .ok_or_else(|| HostError::UnknownEvent(event_name.to_string()))?;
        let capability =
            self.table
                .capability(ty, event_type)
                .ok_or_else(|| HostError::MissingCapability {
                    ty: self.table.type_name(ty).unwrap_or_default().to_string(),
                    event: event_name.to_string(),
                })?;
        if register {
            capability.register(&self.registry, object);
        } else {
            capability.unregister(&self.registry, object);
        }
        Ok(())
    }
}

fn declare_with_ancestors(
    module: &Module,
    table: &mut CapabilityTable,
    index: usize,
    depth: usize,
) -> Option<TypeIndex> {
    let def = &module.types[index];
    if let Some(existing) = table.type_index(&def.name) {
        return Some(existing);
    }
    let parent = def
        .base
        .as_ref()
        .filter(|base| {
            depth < module.types.len() && base.module().map_or(true, |m| m == module.name())
        })
        .and_then(|base| module.type_position(base.name()))
        .and_then(|position| declare_with_ancestors(module, table, position, depth + 1));
    Some(table.declare_type(def.name.clone(), parent))
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("module", &self.module.name())
            .field("instances", &self.live.len())
            .finish()
    }
}
