/*! In-process JIT engine built on Cranelift.
 *
 * Generated code is most useful when it can run right away, call back into the program that made
 * it, and call code generated earlier. This crate compiles `kiln_core::IrModule`s to machine code,
 * links them in memory against each other and against the host process, and answers "where does
 * this symbol live" for anything it has linked.
 *
 * The pieces stack up in layers: `SimpleCompiler` turns a module into an `ObjectImage`, the
 * `ObjectLinkingLayer` places images in executable memory, the `CompileLayer` chains the two, and
 * `JitEngine` owns module handles and the per-module resolvers.
 */

pub mod compile_layer;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod fatal;
pub mod image;
pub mod index;
pub mod key;
pub mod object_layer;
pub mod process;
pub mod resolver;
pub mod symbol;

pub use compile_layer::CompileLayer;
pub use compiler::SimpleCompiler;
pub use engine::JitEngine;
pub use error::{JitError, ResolutionError};
pub use fatal::cant_fail;
pub use image::ObjectImage;
pub use index::{SharedSymbolIndex, SymbolIndex};
pub use key::{KeyAllocator, ModuleKey};
pub use object_layer::{LinkResources, ObjectLinkingLayer, ResourcesProvider};
pub use process::{HostProcess, ProcessSymbols, SymbolMap};
pub use resolver::{
    ErrorReporter, LookupResolver, ResolverTable, SymbolLookup, SymbolResolver, TwoTierLookup,
};
pub use symbol::{JitSymbol, SymbolAddress, SymbolFlags};

#[cfg(test)]
mod tests;
