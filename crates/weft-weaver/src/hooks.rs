//! Lifecycle hooks
//!
//! Component types get registration calls in their activation/deactivation
//! pair, plain types in construction/destruction. Missing hooks are
//! synthesized with a minimal body that preserves the base behavior.

use std::fmt;

use weft_bytecode::{method_attrs, Instruction, MethodDef, MethodRefId, TypeDef};

use crate::config::HookNames;

/// Which pair of hooks a type is woven into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleShape {
    /// Derives from the component base: activation / deactivation
    Component,
    /// Anything else: construction / destruction
    Plain,
}

impl LifecycleShape {
    /// The (registering, unregistering) hooks of this shape
    pub fn hooks(self) -> [HookKind; 2] {
        match self {
            Self::Component => [HookKind::Activate, HookKind::Deactivate],
            Self::Plain => [HookKind::Construct, HookKind::Destruct],
        }
    }
}

impl fmt::Display for LifecycleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => write!(f, "component"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// A single lifecycle hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Component enabled
    Activate,
    /// Component disabled
    Deactivate,
    /// Instance constructed
    Construct,
    /// Instance destroyed
    Destruct,
}

impl HookKind {
    /// Configured method name of this hook
    pub fn method_name(self, names: &HookNames) -> &str {
        match self {
            Self::Activate => &names.activate,
            Self::Deactivate => &names.deactivate,
            Self::Construct => &names.construct,
            Self::Destruct => &names.destruct,
        }
    }

    /// Whether this hook receives register (rather than unregister) calls
    pub fn registers(self) -> bool {
        matches!(self, Self::Activate | Self::Construct)
    }

    /// Method definition used when the type does not declare the hook
    ///
    /// `chain` is the base method to call first, already imported into the
    /// woven module.
    pub fn synthesize(self, name: &str, chain: Option<MethodRefId>) -> MethodDef {
        let (attributes, call): (u32, fn(MethodRefId) -> Instruction) = match self {
            Self::Activate | Self::Deactivate => {
                (method_attrs::PUBLIC | method_attrs::VIRTUAL, Instruction::Call)
            }
            Self::Construct => (
                method_attrs::PUBLIC | method_attrs::CONSTRUCTOR | method_attrs::SPECIAL_NAME,
                Instruction::Call,
            ),
            Self::Destruct => (
                method_attrs::FAMILY | method_attrs::VIRTUAL,
                Instruction::CallVirt,
            ),
        };

        let body = match chain {
            Some(base) if !matches!(self, Self::Activate | Self::Deactivate) => {
                vec![Instruction::LoadSelf, call(base), Instruction::Return]
            }
            _ => vec![Instruction::Return],
        };
        MethodDef::new(name, attributes).with_body(body)
    }
}

/// Index of the zero-argument hook `name`, adding `synthesized` if absent
pub fn get_or_add_hook(
    ty: &mut TypeDef,
    name: &str,
    synthesized: impl FnOnce() -> MethodDef,
) -> usize {
    let existing = ty
        .methods
        .iter()
        .position(|m| m.name == name && m.params.is_empty() && !m.is_static());
    match existing {
        Some(index) => index,
        None => {
            ty.methods.push(synthesized());
            ty.methods.len() - 1
        }
    }
}

/// Insert `load.self; call <target>` for every target before the first
/// instruction that is not a `nop`
pub fn inject_calls(body: &mut Vec<Instruction>, targets: &[MethodRefId]) {
    let at = body
        .iter()
        .position(|instr| *instr != Instruction::Nop)
        .unwrap_or(body.len());
    let injected = targets
        .iter()
        .flat_map(|&target| [Instruction::LoadSelf, Instruction::Call(target)]);
    body.splice(at..at, injected);
}
