//! Weft Compiled Module Format
//!
//! This crate provides the compiled module artifact the weaver reads and
//! patches: type and method metadata, a typed instruction IR for method
//! bodies, and the binary encoder/decoder that persists it (`.wbc`).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod constants;
pub mod display;
pub mod encoder;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod types;
pub mod verify;

pub use constants::ConstantPool;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::Instruction;
pub use module::{flags, Metadata, MethodRefId, Module, ModuleError, ModuleRef};
pub use opcode::Opcode;
pub use types::{method_attrs, type_attrs, MethodDef, MethodRef, Param, TypeDef, TypeRef};
pub use verify::{verify_module, VerifyError};
