/*! IR modules, target descriptors and symbol mangling for the Kiln JIT.
 *
 * A JIT needs to agree with its producers on three things before any machine code exists: what a
 * compilation unit looks like, which target the code is generated for, and how logical names map
 * to the names the loader sees. This crate owns those contracts so the engine and the front-ends
 * that feed it share one definition.
 */

pub mod config;
pub mod mangle;
pub mod module;
pub mod target;

pub use config::{JitConfig, OptLevel};
pub use cranelift_module::Linkage;
pub use mangle::Mangler;
pub use module::{
    DataDecl, DataIndex, DataInit, FuncIndex, FunctionDecl, IrModule, ModuleSymbol,
    DATA_NAMESPACE, FUNCTION_NAMESPACE,
};
pub use target::{DataLayout, Endianness, TargetDescriptor, TargetSummary};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("Duplicate symbol `{name}` in module `{module}`")]
    DuplicateSymbol { module: String, name: String },
    #[error("Unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("Import `{0}` cannot be given a definition")]
    InvalidImportDefinition(String),
    #[error("Symbol `{0}` is already defined")]
    AlreadyDefined(String),
    #[error("Definition of `{0}` does not match its declared signature")]
    SignatureMismatch(String),
    #[error("Symbol `{0}` is declared with a definable linkage but has no definition")]
    MissingDefinition(String),
    #[error("Cranelift error: {0}")]
    CraneliftError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, IrError>;
