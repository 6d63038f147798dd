//! Error types for the JIT layers.

use crate::key::ModuleKey;

/// A lookup that could not produce a trustworthy answer.
///
/// Distinct from "not found", which is an ordinary `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// More than one live module exports a strong definition of the name.
    #[error("symbol `{name}` is defined by more than one module: {modules:?}")]
    Ambiguous {
        name: String,
        modules: Vec<ModuleKey>,
    },

    /// The process-symbol provider failed.
    #[error("process lookup of `{name}` failed: {reason}")]
    Process { name: String, reason: String },
}

/// Failures of the compile and link layers.
#[derive(Debug, thiserror::Error)]
pub enum JitError {
    #[error(transparent)]
    Ir(#[from] kiln_core::IrError),

    /// Cranelift rejected a function body.
    #[error("compiling `{function}` failed: {message}")]
    Compile { function: String, message: String },

    /// The in-memory linker refused the object.
    #[error("linking {key} failed: {message}")]
    Link { key: ModuleKey, message: String },

    /// A relocation targets a symbol nobody provides.
    #[error("{key} references `{name}`, which no module or host symbol provides")]
    UnresolvedSymbol { key: ModuleKey, name: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The resources provider has no resolver for the module being linked.
    #[error("no resolver registered for {0}")]
    MissingResolver(ModuleKey),

    #[error("{0} is not a live module")]
    UnknownModule(ModuleKey),

    /// Removing the module would leave other modules calling into freed memory.
    #[error("{key} is still used by {dependents:?}")]
    DanglingDependency {
        key: ModuleKey,
        dependents: Vec<ModuleKey>,
    },

    #[error("could not open the process image: {0}")]
    ProcessImage(String),

    /// Code for this target cannot run in the current process.
    #[error("target {0} is not the host")]
    UnsupportedTarget(String),
}
