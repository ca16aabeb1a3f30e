//! Constant pool for compiled modules

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Constant pool containing string literals and native function names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    /// String constants
    pub strings: Vec<String>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string constant and return its index
    ///
    /// Identical strings share one slot.
    pub fn add_string(&mut self, s: impl Into<String>) -> u32 {
        let s = s.into();
        if let Some(idx) = self.strings.iter().position(|existing| *existing == s) {
            return idx as u32;
        }
        let index = self.strings.len();
        self.strings.push(s);
        index as u32
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Number of string constants
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the pool holds no constants
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Encode the constant pool to binary format
    ///
    /// Format: string count (u32) followed by length-prefixed strings.
    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    /// Decode a constant pool from binary format
    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }
}
