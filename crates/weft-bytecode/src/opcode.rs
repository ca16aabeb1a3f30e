//! Bytecode opcodes for method bodies
//!
//! Method bodies are a flat stream of single-byte opcodes, some followed by
//! little-endian operands. The set is intentionally small: the weaver only needs
//! to load the receiver, call methods, and return, while user code inside
//! lifecycle hooks reaches the host through native calls.

/// Bytecode opcode enumeration
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation
/// - 0x10-0x1F: Arguments & constants
/// - 0xA0-0xAF: Calls
/// - 0xB0-0xBF: Control flow
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,

    // ===== Arguments & Constants (0x10-0x1F) =====
    /// Push the receiver (argument 0) of an instance method
    LoadSelf = 0x10,
    /// Push an argument (operand: u16 index)
    LoadArg = 0x11,
    /// Push a string constant from the pool (operand: u32 index)
    LoadStr = 0x12,
    /// Push null
    LoadNull = 0x13,

    // ===== Calls (0xA0-0xAF) =====
    /// Static or non-virtual call (operand: u32 method reference index)
    Call = 0xA0,
    /// Virtual call (operand: u32 method reference index)
    CallVirt = 0xA1,
    /// Call a host-bound native function (operand: u32 string pool index)
    CallNative = 0xA2,

    // ===== Control Flow (0xB0-0xBF) =====
    /// Return from the current method
    Return = 0xB0,
    /// Abort the current method
    Trap = 0xB1,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),

            0x10 => Some(Self::LoadSelf),
            0x11 => Some(Self::LoadArg),
            0x12 => Some(Self::LoadStr),
            0x13 => Some(Self::LoadNull),

            0xA0 => Some(Self::Call),
            0xA1 => Some(Self::CallVirt),
            0xA2 => Some(Self::CallNative),

            0xB0 => Some(Self::Return),
            0xB1 => Some(Self::Trap),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Size in bytes of the operands following this opcode
    pub fn operand_size(self) -> usize {
        match self {
            Self::LoadArg => 2,
            Self::LoadStr | Self::Call | Self::CallVirt | Self::CallNative => 4,
            _ => 0,
        }
    }

    /// Check if this opcode is a call
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallVirt | Self::CallNative)
    }

    /// Check if this opcode ends a method body
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Return | Self::Trap)
    }

    /// Get the mnemonic used in disassembly
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::Dup => "dup",
            Self::LoadSelf => "load.self",
            Self::LoadArg => "load.arg",
            Self::LoadStr => "load.str",
            Self::LoadNull => "load.null",
            Self::Call => "call",
            Self::CallVirt => "callvirt",
            Self::CallNative => "call.native",
            Self::Return => "ret",
            Self::Trap => "trap",
        }
    }
}
