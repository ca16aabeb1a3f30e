//! Listener capability discovery
//!
//! Capabilities are read from type metadata only: a type handles `E` when it,
//! or any ancestor, lists an instantiation of the listener interface with `E`
//! as its single argument. Nothing is executed.

use weft_bytecode::{MethodRef, TypeDef, TypeRef};

use crate::config::WeaverConfig;
use crate::error::WeaveWarning;
use crate::hooks::LifecycleShape;
use crate::resolver::{ModuleResolver, ResolvedType, TypeLookup};

/// Capabilities and lifecycle shape of one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Event types, self first then ancestors, duplicates removed
    pub events: Vec<TypeRef>,
    /// Which hook pair the type gets
    pub shape: LifecycleShape,
    /// Set when the inheritance walk stopped early
    pub warning: Option<WeaveWarning>,
}

/// Walk `ty` (defined in the module being woven) and its ancestors
///
/// Event references are rebased so they are valid inside the woven module.
pub fn discover<R: ModuleResolver>(
    lookup: &TypeLookup<'_, R>,
    config: &WeaverConfig,
    ty: &TypeDef,
) -> Discovery {
    let target = lookup.module().name();
    let mut events: Vec<TypeRef> = Vec::new();
    let mut visited: Vec<(Option<String>, String)> = Vec::new();

    let mut current = ResolvedType::Local(ty);
    loop {
        let origin = current.origin().map(str::to_string);
        let def = current.def();
        visited.push((origin.clone(), def.name.clone()));

        for interface in &def.interfaces {
            if interface.name() != config.listener_interface {
                continue;
            }
            let [event] = interface.generic_args() else {
                continue;
            };
            let event = event.rebase(origin.as_deref(), target);
            if !events.contains(&event) {
                events.push(event);
            }
        }

        let Some(base) = def.base.clone() else {
            return Discovery {
                events,
                shape: LifecycleShape::Plain,
                warning: None,
            };
        };

        if base.name() == config.component_base {
            return Discovery {
                events,
                shape: LifecycleShape::Component,
                warning: None,
            };
        }

        let stop = |reason: String| Discovery {
            events: events.clone(),
            shape: LifecycleShape::Plain,
            warning: Some(WeaveWarning::AncestorUnresolved {
                ty: ty.name.clone(),
                ancestor: base.to_string(),
                reason,
            }),
        };

        match lookup.resolve(&base, origin.as_deref()) {
            Ok(next) => {
                let key = (next.origin().map(str::to_string), next.def().name.clone());
                if visited.contains(&key) {
                    return stop("inheritance cycle".to_string());
                }
                current = next;
            }
            Err(e) => return stop(e.to_string()),
        }
    }
}

/// Zero-argument constructor of the direct base of `ty`
///
/// `Ok(None)` means the type has no base. The returned reference is valid
/// inside the woven module.
pub fn base_constructor<R: ModuleResolver>(
    lookup: &TypeLookup<'_, R>,
    config: &WeaverConfig,
    ty: &TypeDef,
) -> Result<Option<MethodRef>, WeaveWarning> {
    let Some(base) = &ty.base else {
        return Ok(None);
    };
    let missing = || WeaveWarning::BaseConstructorMissing {
        ty: ty.name.clone(),
        base: base.to_string(),
    };

    let resolved = lookup.resolve(base, None).map_err(|_| missing())?;
    let found = resolved
        .def()
        .find_method(&config.hooks.construct, 0)
        .is_some_and(|m| m.is_constructor());
    if !found {
        return Err(missing());
    }

    Ok(Some(MethodRef::new(
        base.clone(),
        config.hooks.construct.clone(),
        0,
    )))
}

/// Nearest ancestor declaring a zero-argument destructor
///
/// Unresolvable ancestors end the search without a result.
pub fn inherited_destructor<R: ModuleResolver>(
    lookup: &TypeLookup<'_, R>,
    config: &WeaverConfig,
    ty: &TypeDef,
) -> Option<MethodRef> {
    let target = lookup.module().name();
    let mut next = ty.base.clone().map(|base| (base, None::<String>));
    let mut depth = 0;

    while let Some((base, origin)) = next.take() {
        depth += 1;
        if depth > lookup.module().types.len() + 64 {
            return None;
        }

        let resolved = lookup.resolve(&base, origin.as_deref()).ok()?;
        let def = resolved.def();
        if def
            .find_method(&config.hooks.destruct, 0)
            .is_some_and(|m| !m.is_static())
        {
            return Some(MethodRef::new(
                base.rebase(origin.as_deref(), target),
                config.hooks.destruct.clone(),
                0,
            ));
        }

        let origin = resolved.origin().map(str::to_string);
        next = def.base.clone().map(|b| (b, origin));
    }
    None
}
