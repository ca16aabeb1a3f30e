//! Module and type resolution
//!
//! The weaver needs to look past the module it patches: the registry usually
//! lives in a runtime module, and ancestors may be defined in libraries.
//! Resolution is read-only; resolved modules are shared behind `Rc`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use weft_bytecode::{Module, TypeDef, TypeRef};

/// File extension of compiled modules
pub const MODULE_EXTENSION: &str = "wbc";

/// Resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No search location provides the module
    #[error("module {0} not found")]
    ModuleNotFound(String),

    /// The module exists but cannot be loaded
    #[error("module {name} could not be loaded: {reason}")]
    ModuleUnreadable {
        /// Module name
        name: String,
        /// Failure message
        reason: String,
    },

    /// The module does not define the type
    #[error("type {name} not found in {module}")]
    TypeNotFound {
        /// Module searched
        module: String,
        /// Type name
        name: String,
    },
}

/// Source of referenced modules
pub trait ModuleResolver {
    /// Resolve a module by name
    fn resolve(&self, name: &str) -> Result<Rc<Module>, ResolveError>;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for &R {
    fn resolve(&self, name: &str) -> Result<Rc<Module>, ResolveError> {
        (**self).resolve(name)
    }
}

/// Resolver over a fixed set of in-memory modules
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    modules: FxHashMap<String, Rc<Module>>,
}

impl InMemoryResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a module resolvable under its own name
    pub fn add(&mut self, module: Module) {
        self.modules
            .insert(module.name().to_string(), Rc::new(module));
    }

    /// Builder-style [`add`](Self::add)
    pub fn with(mut self, module: Module) -> Self {
        self.add(module);
        self
    }
}

impl ModuleResolver for InMemoryResolver {
    fn resolve(&self, name: &str) -> Result<Rc<Module>, ResolveError> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::ModuleNotFound(name.to_string()))
    }
}

/// Resolver that loads `<name>.wbc` from a list of directories
///
/// Directories are searched in order; decoded modules are cached for the
/// lifetime of the resolver.
#[derive(Debug, Default)]
pub struct DirectoryResolver {
    search_dirs: Vec<PathBuf>,
    cache: RefCell<FxHashMap<String, Rc<Module>>>,
}

impl DirectoryResolver {
    /// Create a resolver over the given directories
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Configured search directories
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    fn load(&self, name: &str, path: &Path) -> Result<Module, ResolveError> {
        let unreadable = |reason: String| ResolveError::ModuleUnreadable {
            name: name.to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        Module::decode(&bytes).map_err(|e| unreadable(e.to_string()))
    }
}

impl ModuleResolver for DirectoryResolver {
    fn resolve(&self, name: &str) -> Result<Rc<Module>, ResolveError> {
        if let Some(module) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(module));
        }

        let file_name = format!("{}.{}", name, MODULE_EXTENSION);
        let Some(path) = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
        else {
            return Err(ResolveError::ModuleNotFound(name.to_string()));
        };

        let module = Rc::new(self.load(name, &path)?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&module));
        Ok(module)
    }
}

/// A type definition found either in the module being woven or elsewhere
#[derive(Debug, Clone)]
pub enum ResolvedType<'a> {
    /// Defined in the module being woven
    Local(&'a TypeDef),
    /// Defined in a referenced module
    External {
        /// Defining module
        module: Rc<Module>,
        /// Index into `module.types`
        index: usize,
    },
}

impl ResolvedType<'_> {
    /// The type definition
    pub fn def(&self) -> &TypeDef {
        match self {
            Self::Local(def) => def,
            Self::External { module, index } => &module.types[*index],
        }
    }

    /// Name of the defining module, `None` for the module being woven
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Local(_) => None,
            Self::External { module, .. } => Some(module.name()),
        }
    }
}

/// Type lookup rooted at the module being woven
pub struct TypeLookup<'a, R: ModuleResolver> {
    module: &'a Module,
    resolver: &'a R,
}

impl<'a, R: ModuleResolver> TypeLookup<'a, R> {
    /// Create a lookup for `module`
    pub fn new(module: &'a Module, resolver: &'a R) -> Self {
        Self { module, resolver }
    }

    /// The module being woven
    pub fn module(&self) -> &'a Module {
        self.module
    }

    /// Resolve a type reference read from module `origin`
    /// (`None` = the module being woven)
    pub fn resolve(
        &self,
        type_ref: &TypeRef,
        origin: Option<&str>,
    ) -> Result<ResolvedType<'a>, ResolveError> {
        let name = type_ref.name();
        match type_ref.module().or(origin) {
            Some(module_name) if module_name != self.module.name() => {
                let module = self.resolver.resolve(module_name)?;
                let index =
                    module
                        .type_position(name)
                        .ok_or_else(|| ResolveError::TypeNotFound {
                            module: module_name.to_string(),
                            name: name.to_string(),
                        })?;
                Ok(ResolvedType::External { module, index })
            }
            _ => self
                .module
                .find_type(name)
                .map(ResolvedType::Local)
                .ok_or_else(|| ResolveError::TypeNotFound {
                    module: self.module.name().to_string(),
                    name: name.to_string(),
                }),
        }
    }

    /// Resolve a referenced module by name
    pub fn resolve_module(&self, name: &str) -> Result<Rc<Module>, ResolveError> {
        self.resolver.resolve(name)
    }
}
