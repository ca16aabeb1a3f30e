//! Weaver error types
//!
//! `WeaveError` covers failures of the artifact itself (I/O, decoding, a busy
//! session). Conditions that only leave a type or module unpatched are
//! [`WeaveWarning`]s and never abort a pass.

use std::path::PathBuf;

use thiserror::Error;
use weft_bytecode::ModuleError;

/// Hard failures of a weaving session
#[derive(Debug, Error)]
pub enum WeaveError {
    /// Reading or writing the artifact failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not a valid module
    #[error("Failed to decode {}: {source}", .path.display())]
    Decode {
        /// Artifact path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: ModuleError,
    },

    /// Another session holds the artifact
    #[error("Artifact {} is already open in another weaving session", .0.display())]
    SessionBusy(PathBuf),
}

/// Non-fatal conditions reported by a weaving pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeaveWarning {
    /// The registry type is neither defined locally nor in a referenced module
    #[error("{type_name} not found in {module} or its references; module left unpatched")]
    RegistryNotFound {
        /// Module being woven
        module: String,
        /// Registry type searched for
        type_name: String,
    },

    /// The registry does not expose both generic entry points
    #[error("{registry} has no public generic {register}/{unregister} taking one parameter; module left unpatched")]
    EntryPointsMissing {
        /// Registry type name
        registry: String,
        /// Registration entry point name
        register: String,
        /// Unregistration entry point name
        unregister: String,
    },

    /// The inheritance walk stopped at an ancestor that could not be resolved
    #[error("{ty}: ancestor {ancestor} could not be resolved ({reason}); capabilities above it are ignored")]
    AncestorUnresolved {
        /// Type being woven
        ty: String,
        /// Unresolvable ancestor
        ancestor: String,
        /// Resolver message
        reason: String,
    },

    /// A plain type needs a synthesized constructor but its base has none
    #[error("{ty}: base constructor of {base} could not be resolved; type left unpatched")]
    BaseConstructorMissing {
        /// Type being woven
        ty: String,
        /// Base type
        base: String,
    },

    /// The patched module failed verification
    #[error("woven module failed verification: {0}")]
    VerificationFailed(String),

    /// The artifact could not be woven at all
    #[error("{path}: {reason}")]
    ArtifactFailed {
        /// Artifact path
        path: String,
        /// Failure message
        reason: String,
    },
}
