//! Typed instruction IR for method bodies
//!
//! Method bodies are held in memory as `Vec<Instruction>` so that the weaver
//! can insert and synthesize code without touching byte offsets. The opcode
//! stream is produced only when a module is encoded.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::module::MethodRefId;
use crate::opcode::Opcode;

/// A single decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// No operation
    Nop,
    /// Pop top value
    Pop,
    /// Duplicate top value
    Dup,
    /// Push the receiver
    LoadSelf,
    /// Push an argument by index
    LoadArg(u16),
    /// Push a string constant by pool index
    LoadStr(u32),
    /// Push null
    LoadNull,
    /// Non-virtual call through the method reference table
    Call(MethodRefId),
    /// Virtual call through the method reference table
    CallVirt(MethodRefId),
    /// Call a host-bound native function named by a pool string
    CallNative(u32),
    /// Return
    Return,
    /// Abort
    Trap,
}

impl Instruction {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Pop => Opcode::Pop,
            Self::Dup => Opcode::Dup,
            Self::LoadSelf => Opcode::LoadSelf,
            Self::LoadArg(_) => Opcode::LoadArg,
            Self::LoadStr(_) => Opcode::LoadStr,
            Self::LoadNull => Opcode::LoadNull,
            Self::Call(_) => Opcode::Call,
            Self::CallVirt(_) => Opcode::CallVirt,
            Self::CallNative(_) => Opcode::CallNative,
            Self::Return => Opcode::Return,
            Self::Trap => Opcode::Trap,
        }
    }

    /// Method reference targeted by a call instruction
    pub fn method_ref(&self) -> Option<MethodRefId> {
        match self {
            Self::Call(id) | Self::CallVirt(id) => Some(*id),
            _ => None,
        }
    }

    /// Encoded size in bytes (opcode plus operands)
    pub fn encoded_size(&self) -> usize {
        1 + self.opcode().operand_size()
    }

    /// Encode into a writer
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_opcode(self.opcode());
        match *self {
            Self::LoadArg(index) => writer.emit_u16(index),
            Self::LoadStr(index) | Self::CallNative(index) => writer.emit_u32(index),
            Self::Call(id) | Self::CallVirt(id) => writer.emit_u32(id.0),
            _ => {}
        }
    }

    /// Decode one instruction from a reader
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let instr = match reader.read_opcode()? {
            Opcode::Nop => Self::Nop,
            Opcode::Pop => Self::Pop,
            Opcode::Dup => Self::Dup,
            Opcode::LoadSelf => Self::LoadSelf,
            Opcode::LoadArg => Self::LoadArg(reader.read_u16()?),
            Opcode::LoadStr => Self::LoadStr(reader.read_u32()?),
            Opcode::LoadNull => Self::LoadNull,
            Opcode::Call => Self::Call(MethodRefId(reader.read_u32()?)),
            Opcode::CallVirt => Self::CallVirt(MethodRefId(reader.read_u32()?)),
            Opcode::CallNative => Self::CallNative(reader.read_u32()?),
            Opcode::Return => Self::Return,
            Opcode::Trap => Self::Trap,
        };
        Ok(instr)
    }
}

/// Encode a method body into its opcode stream
pub fn encode_body(body: &[Instruction]) -> Vec<u8> {
    let size = body.iter().map(Instruction::encoded_size).sum();
    let mut writer = BytecodeWriter::with_capacity(size);
    for instr in body {
        instr.encode(&mut writer);
    }
    writer.into_bytes()
}

/// Decode an opcode stream into a method body
pub fn decode_body(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut body = Vec::new();
    while reader.has_more() {
        body.push(Instruction::decode(&mut reader)?);
    }
    Ok(body)
}
