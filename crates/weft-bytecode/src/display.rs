//! Disassembly for compiled modules
//!
//! Display implementations used in diagnostics and test failure output.
//! Operands are rendered symbolically when the owning module is known.

use std::fmt;

use crate::instruction::Instruction;
use crate::module::Module;
use crate::types::{MethodDef, TypeDef};

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match self {
            Instruction::LoadArg(index) => write!(f, "{} {}", name, index),
            Instruction::LoadStr(index) | Instruction::CallNative(index) => {
                write!(f, "{} #{}", name, index)
            }
            Instruction::Call(id) | Instruction::CallVirt(id) => write!(f, "{} @{}", name, id.0),
            _ => write!(f, "{}", name),
        }
    }
}

/// Instruction rendered against its module's tables
pub struct Resolved<'a> {
    module: &'a Module,
    instr: &'a Instruction,
}

impl<'a> Resolved<'a> {
    /// Pair an instruction with its module
    pub fn new(module: &'a Module, instr: &'a Instruction) -> Self {
        Self { module, instr }
    }
}

impl fmt::Display for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.instr.opcode().name();
        match *self.instr {
            Instruction::Call(id) | Instruction::CallVirt(id) => match self.module.method_ref(id) {
                Some(target) => write!(f, "{} {}", name, target),
                None => write!(f, "{}", self.instr),
            },
            Instruction::LoadStr(index) | Instruction::CallNative(index) => {
                match self.module.constants.get_string(index) {
                    Some(s) => write!(f, "{} {:?}", name, s),
                    None => write!(f, "{}", self.instr),
                }
            }
            _ => write!(f, "{}", self.instr),
        }
    }
}

/// Disassemble one method body, one instruction per line
pub fn disassemble_method(module: &Module, method: &MethodDef) -> String {
    let mut out = String::new();
    for instr in &method.body {
        out.push_str(&Resolved::new(module, instr).to_string());
        out.push('\n');
    }
    out
}

/// Disassemble a type with all of its methods
pub fn disassemble_type(module: &Module, ty: &TypeDef) -> String {
    let mut out = format!("type {}", ty.name);
    if let Some(base) = &ty.base {
        out.push_str(&format!(" : {}", base));
    }
    out.push_str(" {\n");
    for method in &ty.methods {
        out.push_str(&format!("  {}/{} {{\n", method.name, method.params.len()));
        for line in disassemble_method(module, method).lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("  }\n");
    }
    out.push('}');
    out
}
