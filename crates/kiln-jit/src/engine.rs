/*! The JIT engine: module lifecycle and name lookup.
 *
 * `JitEngine` is the entry point for running generated code in-process. Adding a module compiles
 * and links it immediately; its symbols are then visible both to `find_symbol` and to every module
 * added afterwards. Removing a module frees its code.
 *
 * Failures inside add/remove have no recovery path: they mean the IR producer or the caller broke
 * the contract (bad IR, a reference nobody defines, a stale handle), so they end in a panic with a
 * diagnostic. `find_symbol` is the only operation with an ordinary "not found" outcome.
 */

use std::sync::Arc;

use kiln_core::{IrModule, JitConfig, Mangler, TargetDescriptor};

use crate::compile_layer::CompileLayer;
use crate::compiler::SimpleCompiler;
use crate::error::{JitError, ResolutionError};
use crate::fatal::{cant_fail, fatal};
use crate::index::SharedSymbolIndex;
use crate::key::{KeyAllocator, ModuleKey};
use crate::object_layer::{LinkResources, ObjectLinkingLayer, ResourcesProvider};
use crate::process::{HostProcess, ProcessSymbols, SymbolMap};
use crate::resolver::{ErrorReporter, LookupResolver, ResolverTable, TwoTierLookup};
use crate::symbol::JitSymbol;

pub struct JitEngine {
    target: TargetDescriptor,
    keys: KeyAllocator,
    resolvers: ResolverTable,
    compile_layer: CompileLayer,
    process: Arc<dyn ProcessSymbols>,
}

impl JitEngine {
    /// Engine for `target` that falls back to the symbols of the running process.
    pub fn new(target: TargetDescriptor) -> Result<Self, JitError> {
        let process = HostProcess::open(*target.data_layout())?;
        Self::with_process_symbols(target, Arc::new(process))
    }

    pub fn from_config(config: &JitConfig) -> Result<Self, JitError> {
        let target = TargetDescriptor::from_config(config)?;
        if config.load_process_symbols {
            Self::new(target)
        } else {
            Self::with_process_symbols(target, Arc::new(SymbolMap::new()))
        }
    }

    /// Engine whose host-symbol fallback is `process` instead of the process image.
    pub fn with_process_symbols(
        target: TargetDescriptor,
        process: Arc<dyn ProcessSymbols>,
    ) -> Result<Self, JitError> {
        if !target.is_host() {
            return Err(JitError::UnsupportedTarget(target.triple().to_string()));
        }

        let resolvers = ResolverTable::new();
        let table = resolvers.clone();
        let resources: ResourcesProvider = Box::new(move |key| {
            let resolver = table.get(key).ok_or(JitError::MissingResolver(key))?;
            Ok(LinkResources { resolver })
        });

        let object_layer = ObjectLinkingLayer::new(target.clone(), SharedSymbolIndex::new(), resources);
        let compile_layer = CompileLayer::new(object_layer, SimpleCompiler::new(target.clone()));

        tracing::debug!(triple = %target.triple(), "created JIT engine");
        Ok(Self {
            target,
            keys: KeyAllocator::new(),
            resolvers,
            compile_layer,
            process,
        })
    }

    /// Compiles and links `module`, returning the handle that owns it.
    ///
    /// # Panics
    ///
    /// If the module fails to compile or link, including when a referenced import cannot be
    /// resolved.
    pub fn add_module(&mut self, module: IrModule) -> ModuleKey {
        let key = self.keys.allocate();
        let name = module.name().to_string();
        tracing::debug!(%key, module = %name, "allocated module key");

        let lookup = TwoTierLookup::new(
            self.compile_layer.object_layer().index().clone(),
            self.process.clone(),
        );
        let report: ErrorReporter = Box::new(move |err: ResolutionError| {
            fatal(&format!("lookup_flags failed for {}", key), err);
        });
        self.resolvers
            .insert(key, Arc::new(LookupResolver::new(lookup, report)));

        cant_fail(
            self.compile_layer.add_module(key, module),
            &format!("adding module `{}` as {}", name, key),
        );
        tracing::info!(%key, module = %name, "module added");
        key
    }

    /// Address of the exported symbol with logical name `name` in any live module.
    ///
    /// The host process is never consulted.
    ///
    /// # Panics
    ///
    /// If more than one live module exports a strong definition of `name`.
    pub fn find_symbol(&self, name: &str) -> Option<JitSymbol> {
        let mangled = Mangler::mangle(name, self.target.data_layout());
        cant_fail(
            self.compile_layer.find_symbol(&mangled, true),
            &format!("resolving `{}`", name),
        )
    }

    /// Unlinks the module behind `key` and frees its code.
    ///
    /// # Panics
    ///
    /// If `key` is not live, or another live module still calls into it.
    pub fn remove_module(&mut self, key: ModuleKey) {
        cant_fail(
            self.compile_layer.remove_module(key),
            &format!("removing {}", key),
        );
        self.resolvers.remove(key);
        tracing::info!(%key, "module removed");
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    pub fn contains(&self, key: ModuleKey) -> bool {
        self.compile_layer.object_layer().contains(key)
    }

    /// Live handles in allocation order.
    pub fn live_modules(&self) -> Vec<ModuleKey> {
        self.compile_layer.object_layer().keys().collect()
    }

    /// Mangled name and symbol of everything `key` defines; empty for dead handles.
    pub fn module_symbols(&self, key: ModuleKey) -> Vec<(String, JitSymbol)> {
        self.compile_layer.object_layer().symbols_of(key)
    }

    pub fn compile_layer(&self) -> &CompileLayer {
        &self.compile_layer
    }

    pub fn resolvers(&self) -> &ResolverTable {
        &self.resolvers
    }
}

impl std::fmt::Debug for JitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitEngine")
            .field("target", &self.target)
            .field("keys_issued", &self.keys.issued())
            .field("resolvers", &self.resolvers)
            .finish()
    }
}
