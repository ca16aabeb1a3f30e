//! Compiled module format

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::types::{MethodRef, TypeDef};
use thiserror::Error;

/// Magic number for weft module files: "WEFT"
pub const MAGIC: [u8; 4] = *b"WEFT";

/// Current module format version
pub const VERSION: u32 = 1;

/// Size of the fixed header: magic + version + flags + checksum
pub const HEADER_SIZE: usize = 16;

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected WEFT, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum of the payload
        actual: u32,
    },
}

/// Module flags
pub mod flags {
    /// Module is an editor-only build output
    pub const EDITOR_ONLY: u32 = 1 << 1;
    /// Listener registration has been woven into this module
    pub const WOVEN: u32 = 1 << 2;
}

/// Index into a module's method reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRefId(pub u32);

/// Dependency on another module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    /// Referenced module name
    pub name: String,
}

/// Module metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Module name
    pub name: String,
    /// Source file path
    pub source_file: Option<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        match &self.source_file {
            Some(path) => {
                writer.emit_bool(true);
                writer.emit_string(path);
            }
            None => writer.emit_bool(false),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let source_file = if reader.read_bool()? {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self { name, source_file })
    }
}

/// A compiled module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Magic number (must be "WEFT")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Module flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Modules this module references
    pub references: Vec<ModuleRef>,
    /// Call targets used by method bodies
    pub method_refs: Vec<MethodRef>,
    /// Type definitions
    pub types: Vec<TypeDef>,
    /// Module metadata
    pub metadata: Metadata,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            constants: ConstantPool::new(),
            references: Vec::new(),
            method_refs: Vec::new(),
            types: Vec::new(),
            metadata: Metadata {
                name: name.into(),
                source_file: None,
            },
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether listener registration has already been woven in
    pub fn is_woven(&self) -> bool {
        self.flags & flags::WOVEN != 0
    }

    /// Mark the module as woven
    pub fn mark_woven(&mut self) {
        self.flags |= flags::WOVEN;
    }

    /// Find a type definition by name
    pub fn find_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Index of a type definition by name
    pub fn type_position(&self, name: &str) -> Option<usize> {
        self.types.iter().position(|t| t.name == name)
    }

    /// Add a type definition
    pub fn add_type(&mut self, ty: TypeDef) -> usize {
        self.types.push(ty);
        self.types.len() - 1
    }

    /// Record a dependency on another module (deduplicated)
    pub fn add_reference(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.metadata.name && !self.references.iter().any(|r| r.name == name) {
            self.references.push(ModuleRef { name });
        }
    }

    /// Import a method reference, returning its table index
    ///
    /// Identical references share one slot. Modules named by the reference are
    /// added to the reference list.
    pub fn import_method(&mut self, method: MethodRef) -> MethodRefId {
        if let Some(idx) = self.method_refs.iter().position(|m| *m == method) {
            return MethodRefId(idx as u32);
        }
        if let Some(module) = method.declaring_type.module() {
            self.add_reference(module.to_string());
        }
        for arg in &method.generic_args {
            if let Some(module) = arg.module() {
                self.add_reference(module.to_string());
            }
        }
        self.method_refs.push(method);
        MethodRefId((self.method_refs.len() - 1) as u32)
    }

    /// Look up a method reference
    pub fn method_ref(&self, id: MethodRefId) -> Option<&MethodRef> {
        self.method_refs.get(id.0 as usize)
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("Invalid magic number".to_string());
        }
        if self.version != VERSION {
            return Err(format!("Unsupported version: {}", self.version));
        }
        Ok(())
    }

    /// Encode the module to binary format (.wbc)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - Module references
    /// - Method reference table
    /// - Type definitions (with encoded method bodies)
    /// - Metadata
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_u32();

        self.constants.encode(&mut writer);

        writer.emit_u32(self.references.len() as u32);
        for reference in &self.references {
            writer.emit_string(&reference.name);
        }

        writer.emit_u32(self.method_refs.len() as u32);
        for method in &self.method_refs {
            method.encode(&mut writer);
        }

        writer.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            ty.encode(&mut writer);
        }

        self.metadata.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic_bytes = reader.read_bytes(4)?;
        let magic = [magic_bytes[0], magic_bytes[1], magic_bytes[2], magic_bytes[3]];
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_SIZE..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let reference_count = reader.read_u32()? as usize;
        let mut references = Vec::with_capacity(reference_count.min(reader.remaining()));
        for _ in 0..reference_count {
            references.push(ModuleRef {
                name: reader.read_string()?,
            });
        }

        let method_ref_count = reader.read_u32()? as usize;
        let mut method_refs = Vec::with_capacity(method_ref_count.min(reader.remaining()));
        for _ in 0..method_ref_count {
            method_refs.push(MethodRef::decode(&mut reader)?);
        }

        let type_count = reader.read_u32()? as usize;
        let mut types = Vec::with_capacity(type_count.min(reader.remaining()));
        for _ in 0..type_count {
            types.push(TypeDef::decode(&mut reader)?);
        }

        let metadata = Metadata::decode(&mut reader)?;

        Ok(Self {
            magic,
            version,
            flags,
            constants,
            references,
            method_refs,
            types,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::types::{method_attrs, type_attrs, MethodDef, Param, TypeRef};

    fn registry_register() -> MethodRef {
        MethodRef::new(TypeRef::external("weft", "weft.EventRegistry"), "register", 1)
            .instantiate(vec![TypeRef::local("game.Ping")])
    }

    #[test]
    fn test_module_creation() {
        let module = Module::new("game");
        assert_eq!(module.magic, MAGIC);
        assert_eq!(module.version, VERSION);
        assert_eq!(module.flags, 0);
        assert!(!module.is_woven());
        assert!(module.validate().is_ok());
    }

    #[test]
    fn test_empty_module_encoding() {
        let module = Module::new("empty");
        let bytes = module.encode();
        assert_eq!(&bytes[..4], b"WEFT");

        let decoded = Module::decode(&bytes).unwrap();
        assert_eq!(decoded, module);
    }

    #[test]
    fn test_module_with_types() {
        let mut module = Module::new("game");
        let register = module.import_method(registry_register());
        module.add_type(
            TypeDef::new("game.Player")
                .with_base(TypeRef::external("host", "host.Component"))
                .with_interface(TypeRef::generic(
                    TypeRef::external("weft", "weft.Listener"),
                    vec![TypeRef::local("game.Ping")],
                ))
                .with_method(
                    MethodDef::new("on_enable", method_attrs::PUBLIC | method_attrs::VIRTUAL)
                        .with_body(vec![
                            Instruction::LoadSelf,
                            Instruction::Call(register),
                            Instruction::Return,
                        ]),
                )
                .with_method(
                    MethodDef::new("on_event", method_attrs::PUBLIC)
                        .with_param(Param::new("e", TypeRef::local("game.Ping")))
                        .with_body(vec![Instruction::Return]),
                ),
        );
        module.add_type(TypeDef::new("game.Ping"));

        let decoded = Module::decode(&module.encode()).unwrap();
        assert_eq!(decoded.types.len(), 2);
        let player = decoded.find_type("game.Player").unwrap();
        assert_eq!(player.methods.len(), 2);
        assert_eq!(player.methods[0].body.len(), 3);
        assert_eq!(player.interfaces[0].generic_args().len(), 1);
        assert_eq!(decoded.method_ref(register), Some(&registry_register()));
        assert_eq!(decoded, module);
    }

    #[test]
    fn test_import_method_dedups_and_records_references() {
        let mut module = Module::new("game");
        let a = module.import_method(registry_register());
        let b = module.import_method(registry_register());
        assert_eq!(a, b);
        assert_eq!(module.method_refs.len(), 1);
        assert_eq!(module.references.len(), 1);
        assert_eq!(module.references[0].name, "weft");
    }

    #[test]
    fn test_self_reference_is_not_recorded() {
        let mut module = Module::new("game");
        module.add_reference("game");
        module.add_reference("host");
        module.add_reference("host");
        assert_eq!(module.references.len(), 1);
    }

    #[test]
    fn test_woven_flag_survives_encoding() {
        let mut module = Module::new("game");
        module.flags = flags::EDITOR_ONLY;
        module.mark_woven();

        let decoded = Module::decode(&module.encode()).unwrap();
        assert!(decoded.is_woven());
        assert_eq!(decoded.flags & flags::EDITOR_ONLY, flags::EDITOR_ONLY);
    }

    #[test]
    fn test_abstract_type_flags_survive_encoding() {
        let mut module = Module::new("game");
        module.add_type(TypeDef::new("game.Base").with_attributes(type_attrs::ABSTRACT));
        let decoded = Module::decode(&module.encode()).unwrap();
        assert!(decoded.types[0].is_abstract());
    }

    #[test]
    fn test_module_checksum_validation() {
        let mut module = Module::new("game");
        module.add_type(TypeDef::new("game.Ping"));
        let mut bytes = module.encode();

        bytes[HEADER_SIZE + 2] ^= 0xFF;
        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic_number() {
        let mut bytes = vec![b'X', b'X', b'X', b'X'];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::InvalidMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"WEFT");
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let result = Module::decode(&bytes);
        assert!(matches!(result, Err(ModuleError::UnsupportedVersion(999))));
    }

    #[test]
    fn test_truncated_header() {
        let result = Module::decode(b"WEF");
        assert!(matches!(result, Err(ModuleError::DecodeError(_))));
    }
}
