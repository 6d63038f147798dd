/*! Unified interface for running Cranelift IR in-process.
 *
 * Single import for everything you need: building IR modules, describing the target, and handing
 * modules to the JIT engine to get callable addresses back.
 */

pub use kiln_core as core;
pub use kiln_jit as jit;

pub use kiln_core::{
    DataInit, IrError, IrModule, JitConfig, Linkage, Mangler, OptLevel, TargetDescriptor,
};

pub use kiln_jit::{
    JitEngine, JitError, JitSymbol, ModuleKey, ProcessSymbols, SymbolAddress, SymbolFlags,
    SymbolMap,
};
