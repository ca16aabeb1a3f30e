//! Type and method metadata
//!
//! Type definitions carry their base type and implemented interfaces as
//! [`TypeRef`]s so that inheritance chains and generic interface
//! instantiations (such as `weft.Listener<game.Ping>`) can be inspected
//! without loading any code.

use std::fmt;

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instruction::{decode_body, encode_body, Instruction};

/// Type attribute flags
pub mod type_attrs {
    /// Visible outside the module
    pub const PUBLIC: u32 = 1 << 0;
    /// Cannot be instantiated
    pub const ABSTRACT: u32 = 1 << 1;
    /// Interface definition
    pub const INTERFACE: u32 = 1 << 2;
    /// Cannot be derived from
    pub const SEALED: u32 = 1 << 3;
}

/// Method attribute flags
pub mod method_attrs {
    /// Callable from any module
    pub const PUBLIC: u32 = 1 << 0;
    /// No receiver
    pub const STATIC: u32 = 1 << 1;
    /// Dispatched through the receiver's type
    pub const VIRTUAL: u32 = 1 << 2;
    /// Declared without a body
    pub const ABSTRACT: u32 = 1 << 3;
    /// Instance constructor
    pub const CONSTRUCTOR: u32 = 1 << 4;
    /// Callable from derived types only
    pub const FAMILY: u32 = 1 << 5;
    /// Name has meaning to the host runtime
    pub const SPECIAL_NAME: u32 = 1 << 6;
}

const TYPE_REF_NAMED: u8 = 0;
const TYPE_REF_GENERIC: u8 = 1;

/// Reference to a type, possibly in another module, possibly instantiated
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A named type definition
    Named {
        /// Defining module, `None` for the module holding the reference
        module: Option<String>,
        /// Fully qualified type name
        name: String,
    },
    /// A generic type instantiated with type arguments
    Generic {
        /// The generic type definition
        definition: Box<TypeRef>,
        /// Type arguments, in parameter order
        args: Vec<TypeRef>,
    },
}

impl TypeRef {
    /// Reference to a type defined in the same module
    pub fn local(name: impl Into<String>) -> Self {
        Self::Named {
            module: None,
            name: name.into(),
        }
    }

    /// Reference to a type defined in another module
    pub fn external(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            module: Some(module.into()),
            name: name.into(),
        }
    }

    /// Instantiate a generic definition
    pub fn generic(definition: TypeRef, args: Vec<TypeRef>) -> Self {
        Self::Generic {
            definition: Box::new(definition),
            args,
        }
    }

    /// The named definition underneath any instantiation
    pub fn element(&self) -> &TypeRef {
        match self {
            Self::Named { .. } => self,
            Self::Generic { definition, .. } => definition.element(),
        }
    }

    /// Name of the element type
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::Generic { definition, .. } => definition.name(),
        }
    }

    /// Defining module of the element type
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::Named { module, .. } => module.as_deref(),
            Self::Generic { definition, .. } => definition.module(),
        }
    }

    /// Type arguments, empty for non-generic references
    pub fn generic_args(&self) -> &[TypeRef] {
        match self {
            Self::Named { .. } => &[],
            Self::Generic { args, .. } => args,
        }
    }

    /// Whether this is a generic instantiation
    pub fn is_generic_instance(&self) -> bool {
        matches!(self, Self::Generic { .. })
    }

    /// Re-express a reference read from module `origin` so that it is valid
    /// inside module `target`.
    ///
    /// `origin` is `None` when the reference already belongs to `target`.
    pub fn rebase(&self, origin: Option<&str>, target: &str) -> TypeRef {
        match self {
            Self::Named { module, name } => {
                let module = module.as_deref().or(origin);
                match module {
                    Some(m) if m != target => Self::external(m, name.clone()),
                    _ => Self::local(name.clone()),
                }
            }
            Self::Generic { definition, args } => Self::Generic {
                definition: Box::new(definition.rebase(origin, target)),
                args: args.iter().map(|a| a.rebase(origin, target)).collect(),
            },
        }
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Self::Named { module, name } => {
                writer.emit_u8(TYPE_REF_NAMED);
                match module {
                    Some(m) => {
                        writer.emit_bool(true);
                        writer.emit_string(m);
                    }
                    None => writer.emit_bool(false),
                }
                writer.emit_string(name);
            }
            Self::Generic { definition, args } => {
                writer.emit_u8(TYPE_REF_GENERIC);
                definition.encode(writer);
                writer.emit_u16(args.len() as u16);
                for arg in args {
                    arg.encode(writer);
                }
            }
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        match reader.read_u8()? {
            TYPE_REF_NAMED => {
                let module = if reader.read_bool()? {
                    Some(reader.read_string()?)
                } else {
                    None
                };
                let name = reader.read_string()?;
                Ok(Self::Named { module, name })
            }
            TYPE_REF_GENERIC => {
                let definition = Box::new(Self::decode(reader)?);
                let count = reader.read_u16()? as usize;
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(Self::decode(reader)?);
                }
                Ok(Self::Generic { definition, args })
            }
            tag => Err(DecodeError::InvalidTag {
                kind: "type reference",
                tag,
                offset,
            }),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named {
                module: Some(module),
                name,
            } => write!(f, "[{}]{}", module, name),
            Self::Named { module: None, name } => write!(f, "{}", name),
            Self::Generic { definition, args } => {
                write!(f, "{}<", definition)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeRef,
}

impl Param {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Method definition with its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Attribute flags (see [`method_attrs`])
    pub attributes: u32,
    /// Number of generic type parameters
    pub generic_param_count: u16,
    /// Value parameters (the receiver is implicit)
    pub params: Vec<Param>,
    /// Return type, `None` for void
    pub return_type: Option<TypeRef>,
    /// Method body
    pub body: Vec<Instruction>,
}

impl MethodDef {
    /// Create a void, parameterless method with an empty body
    pub fn new(name: impl Into<String>, attributes: u32) -> Self {
        Self {
            name: name.into(),
            attributes,
            generic_param_count: 0,
            params: Vec::new(),
            return_type: None,
            body: Vec::new(),
        }
    }

    /// Replace the body
    pub fn with_body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body;
        self
    }

    /// Append a parameter
    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Set the number of generic parameters
    pub fn with_generic_params(mut self, count: u16) -> Self {
        self.generic_param_count = count;
        self
    }

    fn has(&self, flag: u32) -> bool {
        self.attributes & flag != 0
    }

    /// Whether the method is public
    pub fn is_public(&self) -> bool {
        self.has(method_attrs::PUBLIC)
    }

    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.has(method_attrs::STATIC)
    }

    /// Whether the method is virtual
    pub fn is_virtual(&self) -> bool {
        self.has(method_attrs::VIRTUAL)
    }

    /// Whether the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.has(method_attrs::ABSTRACT)
    }

    /// Whether the method is an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.has(method_attrs::CONSTRUCTOR) && !self.is_static()
    }

    /// Whether the method declares generic parameters
    pub fn has_generic_params(&self) -> bool {
        self.generic_param_count > 0
    }

    /// Whether the method takes value parameters
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.attributes);
        writer.emit_u16(self.generic_param_count);

        writer.emit_u16(self.params.len() as u16);
        for param in &self.params {
            writer.emit_string(&param.name);
            param.ty.encode(writer);
        }

        match &self.return_type {
            Some(ty) => {
                writer.emit_bool(true);
                ty.encode(writer);
            }
            None => writer.emit_bool(false),
        }

        let code = encode_body(&self.body);
        writer.emit_u32(code.len() as u32);
        writer.buffer.extend_from_slice(&code);
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let attributes = reader.read_u32()?;
        let generic_param_count = reader.read_u16()?;

        let param_count = reader.read_u16()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            let name = reader.read_string()?;
            let ty = TypeRef::decode(reader)?;
            params.push(Param { name, ty });
        }

        let return_type = if reader.read_bool()? {
            Some(TypeRef::decode(reader)?)
        } else {
            None
        };

        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;
        let body = decode_body(&code)?;

        Ok(Self {
            name,
            attributes,
            generic_param_count,
            params,
            return_type,
            body,
        })
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Fully qualified type name
    pub name: String,
    /// Attribute flags (see [`type_attrs`])
    pub attributes: u32,
    /// Base type, `None` for roots
    pub base: Option<TypeRef>,
    /// Implemented interfaces, possibly generic instantiations
    pub interfaces: Vec<TypeRef>,
    /// Number of generic type parameters
    pub generic_param_count: u16,
    /// Method definitions
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Create a public, non-generic type with no base
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: type_attrs::PUBLIC,
            base: None,
            interfaces: Vec::new(),
            generic_param_count: 0,
            methods: Vec::new(),
        }
    }

    /// Set the base type
    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.base = Some(base);
        self
    }

    /// Add an implemented interface
    pub fn with_interface(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add a method
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Add attribute flags
    pub fn with_attributes(mut self, attributes: u32) -> Self {
        self.attributes |= attributes;
        self
    }

    /// Set the number of generic parameters
    pub fn with_generic_params(mut self, count: u16) -> Self {
        self.generic_param_count = count;
        self
    }

    /// Whether the type is abstract
    pub fn is_abstract(&self) -> bool {
        self.attributes & type_attrs::ABSTRACT != 0
    }

    /// Whether the type is an interface
    pub fn is_interface(&self) -> bool {
        self.attributes & type_attrs::INTERFACE != 0
    }

    /// Find a method by name and value-parameter count
    pub fn find_method(&self, name: &str, param_count: usize) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.params.len() == param_count)
    }

    /// Index of a method by name and value-parameter count
    pub fn method_position(&self, name: &str, param_count: usize) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.params.len() == param_count)
    }

    /// First non-static constructor
    pub fn instance_constructor(&self) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.is_constructor())
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.attributes);
        writer.emit_u16(self.generic_param_count);

        match &self.base {
            Some(base) => {
                writer.emit_bool(true);
                base.encode(writer);
            }
            None => writer.emit_bool(false),
        }

        writer.emit_u16(self.interfaces.len() as u16);
        for interface in &self.interfaces {
            interface.encode(writer);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(writer);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let attributes = reader.read_u32()?;
        let generic_param_count = reader.read_u16()?;

        let base = if reader.read_bool()? {
            Some(TypeRef::decode(reader)?)
        } else {
            None
        };

        let interface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(TypeRef::decode(reader)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(reader)?);
        }

        Ok(Self {
            name,
            attributes,
            base,
            interfaces,
            generic_param_count,
            methods,
        })
    }
}

/// Reference to a method, used as a call target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Type declaring the method
    pub declaring_type: TypeRef,
    /// Method name
    pub name: String,
    /// Type arguments for a generic method instantiation
    pub generic_args: Vec<TypeRef>,
    /// Number of value parameters
    pub param_count: u16,
}

impl MethodRef {
    /// Reference to a non-generic method
    pub fn new(declaring_type: TypeRef, name: impl Into<String>, param_count: u16) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            generic_args: Vec::new(),
            param_count,
        }
    }

    /// Instantiate this reference with type arguments
    pub fn instantiate(mut self, generic_args: Vec<TypeRef>) -> Self {
        self.generic_args = generic_args;
        self
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        self.declaring_type.encode(writer);
        writer.emit_string(&self.name);
        writer.emit_u16(self.generic_args.len() as u16);
        for arg in &self.generic_args {
            arg.encode(writer);
        }
        writer.emit_u16(self.param_count);
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let declaring_type = TypeRef::decode(reader)?;
        let name = reader.read_string()?;
        let arg_count = reader.read_u16()? as usize;
        let mut generic_args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            generic_args.push(TypeRef::decode(reader)?);
        }
        let param_count = reader.read_u16()?;
        Ok(Self {
            declaring_type,
            name,
            generic_args,
            param_count,
        })
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        write!(f, "/{}", self.param_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener_of(event: TypeRef) -> TypeRef {
        TypeRef::generic(TypeRef::external("weft", "weft.Listener"), vec![event])
    }

    #[test]
    fn test_generic_accessors() {
        let iface = listener_of(TypeRef::local("game.Ping"));
        assert!(iface.is_generic_instance());
        assert_eq!(iface.name(), "weft.Listener");
        assert_eq!(iface.module(), Some("weft"));
        assert_eq!(iface.generic_args(), &[TypeRef::local("game.Ping")]);
    }

    #[test]
    fn test_rebase_local_from_external_origin() {
        let arg = TypeRef::local("lib.Tick");
        assert_eq!(
            arg.rebase(Some("lib"), "game"),
            TypeRef::external("lib", "lib.Tick")
        );
    }

    #[test]
    fn test_rebase_back_into_target() {
        let arg = TypeRef::external("game", "game.Ping");
        assert_eq!(arg.rebase(Some("lib"), "game"), TypeRef::local("game.Ping"));
        assert_eq!(
            TypeRef::local("game.Ping").rebase(None, "game"),
            TypeRef::local("game.Ping")
        );
    }

    #[test]
    fn test_rebase_generic_arguments() {
        let iface = listener_of(TypeRef::local("lib.Tick"));
        let rebased = iface.rebase(Some("lib"), "game");
        assert_eq!(
            rebased.generic_args(),
            &[TypeRef::external("lib", "lib.Tick")]
        );
        assert_eq!(rebased.module(), Some("weft"));
    }

    #[test]
    fn test_type_ref_display() {
        let iface = listener_of(TypeRef::local("game.Ping"));
        assert_eq!(iface.to_string(), "[weft]weft.Listener<game.Ping>");
    }

    #[test]
    fn test_method_flags() {
        let ctor = MethodDef::new(".ctor", method_attrs::PUBLIC | method_attrs::CONSTRUCTOR);
        assert!(ctor.is_constructor());
        assert!(ctor.is_public());
        assert!(!ctor.is_virtual());

        let cctor = MethodDef::new(".cctor", method_attrs::STATIC | method_attrs::CONSTRUCTOR);
        assert!(!cctor.is_constructor());
    }

    #[test]
    fn test_find_method_by_arity() {
        let ty = TypeDef::new("game.Player")
            .with_method(MethodDef::new("on_enable", method_attrs::PUBLIC))
            .with_method(
                MethodDef::new("on_enable", method_attrs::PUBLIC)
                    .with_param(Param::new("flag", TypeRef::local("bool"))),
            );
        assert_eq!(ty.method_position("on_enable", 0), Some(0));
        assert_eq!(ty.method_position("on_enable", 1), Some(1));
        assert!(ty.find_method("on_disable", 0).is_none());
    }
}
