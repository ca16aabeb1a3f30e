//! Weaver configuration (weft.toml)
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Weaver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeaverConfig {
    /// Artifact file names that are woven; all others pass through
    pub targets: Vec<String>,

    /// Where the event registry lives and what its entry points are called
    pub registry: RegistryConfig,

    /// Fully qualified name of the generic listener capability interface
    #[serde(rename = "listener-interface")]
    pub listener_interface: String,

    /// Fully qualified name of the stateful component base type
    #[serde(rename = "component-base")]
    pub component_base: String,

    /// Lifecycle hook method names
    pub hooks: HookNames,

    /// Directories searched for referenced modules
    #[serde(rename = "search-dirs")]
    pub search_dirs: Vec<PathBuf>,

    /// Run the module verifier after weaving
    pub verify: bool,
}

/// Registry type and entry-point names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Fully qualified registry type name
    #[serde(rename = "type")]
    pub type_name: String,

    /// Referenced modules whose name starts with this prefix are searched
    #[serde(rename = "module-prefix")]
    pub module_prefix: String,

    /// Generic registration entry point
    pub register: String,

    /// Generic unregistration entry point
    pub unregister: String,
}

/// Lifecycle hook method names for both lifecycle shapes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HookNames {
    /// Component activation
    pub activate: String,
    /// Component deactivation
    pub deactivate: String,
    /// Plain type construction
    pub construct: String,
    /// Plain type destruction
    pub destruct: String,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            targets: vec!["app.wbc".to_string(), "app-editor.wbc".to_string()],
            registry: RegistryConfig::default(),
            listener_interface: "weft.Listener".to_string(),
            component_base: "host.Component".to_string(),
            hooks: HookNames::default(),
            search_dirs: Vec::new(),
            verify: true,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            type_name: "weft.EventRegistry".to_string(),
            module_prefix: "weft".to_string(),
            register: "register".to_string(),
            unregister: "unregister".to_string(),
        }
    }
}

impl Default for HookNames {
    fn default() -> Self {
        Self {
            activate: "on_enable".to_string(),
            deactivate: "on_disable".to_string(),
            construct: ".ctor".to_string(),
            destruct: "finalize".to_string(),
        }
    }
}

impl WeaverConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: WeaverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("registry.type", &self.registry.type_name),
            ("registry.register", &self.registry.register),
            ("registry.unregister", &self.registry.unregister),
            ("listener-interface", &self.listener_interface),
            ("component-base", &self.component_base),
            ("hooks.activate", &self.hooks.activate),
            ("hooks.deactivate", &self.hooks.deactivate),
            ("hooks.construct", &self.hooks.construct),
            ("hooks.destruct", &self.hooks.destruct),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} cannot be empty",
                    field
                )));
            }
        }

        if self.registry.register == self.registry.unregister {
            return Err(ConfigError::ValidationError(
                "registry.register and registry.unregister must differ".to_string(),
            ));
        }

        if self.hooks.activate == self.hooks.deactivate
            || self.hooks.construct == self.hooks.destruct
        {
            return Err(ConfigError::ValidationError(
                "paired lifecycle hooks must have distinct names".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether an artifact path passes the target name filter
    pub fn is_target(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.targets.iter().any(|t| t == name))
    }
}
