//! Module verification
//!
//! Structural checks run after a module has been produced or patched: every
//! body terminates, every operand indexes a valid table slot, and calls to
//! types defined in the same module name a method that actually exists.

use crate::instruction::Instruction;
use crate::module::Module;
use crate::types::{MethodDef, TypeDef, TypeRef};

/// Module verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Execution falls off the end of a body
    #[error("{method}: execution falls off end of body")]
    FallOffEnd {
        /// Qualified method name
        method: String,
    },

    /// Non-abstract method without a body
    #[error("{method}: missing body")]
    MissingBody {
        /// Qualified method name
        method: String,
    },

    /// Call through a method reference index out of range
    #[error("{method}: invalid method reference {index} at instruction {at}")]
    InvalidMethodRef {
        /// Qualified method name
        method: String,
        /// Offending index
        index: u32,
        /// Instruction position
        at: usize,
    },

    /// Constant pool index out of range
    #[error("{method}: invalid constant reference {index} at instruction {at}")]
    InvalidConstantRef {
        /// Qualified method name
        method: String,
        /// Offending index
        index: u32,
        /// Instruction position
        at: usize,
    },

    /// Argument index out of range
    #[error("{method}: invalid argument {index} (params: {max}) at instruction {at}")]
    InvalidArgRef {
        /// Qualified method name
        method: String,
        /// Offending index
        index: u16,
        /// Number of declared parameters
        max: usize,
        /// Instruction position
        at: usize,
    },

    /// Receiver loaded inside a static method
    #[error("{method}: load.self in static method at instruction {at}")]
    SelfInStaticMethod {
        /// Qualified method name
        method: String,
        /// Instruction position
        at: usize,
    },

    /// Call to a local type that does not declare the target method
    #[error("method reference {target} does not match any method of {declaring}")]
    UnresolvedLocalMethod {
        /// Rendered method reference
        target: String,
        /// Declaring type name
        declaring: String,
    },

    /// Module validation error
    #[error("Module validation error: {0}")]
    ModuleValidation(String),
}

/// Verify a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.validate().map_err(VerifyError::ModuleValidation)?;

    verify_local_method_refs(module)?;

    for ty in &module.types {
        for method in &ty.methods {
            verify_method(module, ty, method)?;
        }
    }

    Ok(())
}

fn verify_local_method_refs(module: &Module) -> Result<(), VerifyError> {
    for method_ref in &module.method_refs {
        let TypeRef::Named { module: None, name } = &method_ref.declaring_type else {
            continue;
        };
        // Local names that are not defined here belong to the host runtime.
        let Some(declaring) = module.find_type(name) else {
            continue;
        };
        let found = declaring.methods.iter().any(|m| {
            m.name == method_ref.name
                && m.params.len() == method_ref.param_count as usize
                && m.generic_param_count as usize == method_ref.generic_args.len()
        });
        if !found {
            return Err(VerifyError::UnresolvedLocalMethod {
                target: method_ref.to_string(),
                declaring: name.clone(),
            });
        }
    }
    Ok(())
}

fn verify_method(module: &Module, ty: &TypeDef, method: &MethodDef) -> Result<(), VerifyError> {
    let qualified = || format!("{}::{}", ty.name, method.name);

    if method.is_abstract() || ty.is_interface() {
        return Ok(());
    }

    let Some(last) = method.body.last() else {
        return Err(VerifyError::MissingBody {
            method: qualified(),
        });
    };

    for (at, instr) in method.body.iter().enumerate() {
        match *instr {
            Instruction::Call(id) | Instruction::CallVirt(id) => {
                if module.method_ref(id).is_none() {
                    return Err(VerifyError::InvalidMethodRef {
                        method: qualified(),
                        index: id.0,
                        at,
                    });
                }
            }
            Instruction::LoadStr(index) | Instruction::CallNative(index) => {
                if module.constants.get_string(index).is_none() {
                    return Err(VerifyError::InvalidConstantRef {
                        method: qualified(),
                        index,
                        at,
                    });
                }
            }
            Instruction::LoadArg(index) => {
                if index as usize >= method.params.len() {
                    return Err(VerifyError::InvalidArgRef {
                        method: qualified(),
                        index,
                        max: method.params.len(),
                        at,
                    });
                }
            }
            Instruction::LoadSelf if method.is_static() => {
                return Err(VerifyError::SelfInStaticMethod {
                    method: qualified(),
                    at,
                });
            }
            _ => {}
        }
    }

    if !last.opcode().is_terminator() {
        return Err(VerifyError::FallOffEnd {
            method: qualified(),
        });
    }

    Ok(())
}
