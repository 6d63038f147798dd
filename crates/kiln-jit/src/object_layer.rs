/*! In-memory linking of compiled object images.
 *
 * Each image gets its own `JITModule`: symbols are declared in the image's order, so the module
 * local indices carried by relocations line up with Cranelift's `FuncId`/`DataId`, and imports are
 * bound to the addresses the module's resolver hands back. Once finalized, the image's definitions
 * go into the shared symbol index where later modules and lookups can see them.
 *
 * Memory is released by `remove_object`, only when no live module was linked against it, and for
 * every module still live when the layer itself is dropped.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, DataDescription, DataId, FuncId, Module};
use kiln_core::{DataInit, TargetDescriptor};

use crate::error::{JitError, ResolutionError};
use crate::image::ObjectImage;
use crate::index::SharedSymbolIndex;
use crate::key::ModuleKey;
use crate::resolver::SymbolResolver;
use crate::symbol::{JitSymbol, SymbolAddress, SymbolFlags};

/// Everything the linker needs from outside to link one module.
#[derive(Clone)]
pub struct LinkResources {
    pub resolver: Arc<dyn SymbolResolver>,
}

pub type ResourcesProvider = Box<dyn Fn(ModuleKey) -> Result<LinkResources, JitError> + Send + Sync>;

/// Owns the executable memory of one linked module.
struct LinkedObject {
    name: String,
    module: JITModule,
    dependencies: BTreeSet<ModuleKey>,
}

// SAFETY: the JITModule is only touched through `&mut ObjectLinkingLayer` once finalized; the
// raw pointers it holds refer to memory that this object alone frees.
unsafe impl Send for LinkedObject {}

pub struct ObjectLinkingLayer {
    target: TargetDescriptor,
    index: SharedSymbolIndex,
    resources: ResourcesProvider,
    objects: BTreeMap<ModuleKey, LinkedObject>,
}

impl ObjectLinkingLayer {
    pub fn new(target: TargetDescriptor, index: SharedSymbolIndex, resources: ResourcesProvider) -> Self {
        Self {
            target,
            index,
            resources,
            objects: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &SharedSymbolIndex {
        &self.index
    }

    /// Links `image` under `key` and publishes its definitions.
    pub fn add_object(&mut self, key: ModuleKey, image: ObjectImage) -> Result<(), JitError> {
        if self.objects.contains_key(&key) {
            return Err(JitError::Link {
                key,
                message: "module is already linked".to_string(),
            });
        }

        let resources = (self.resources)(key)?;
        let resolved = resolve_imports(resources.resolver.as_ref(), &image)?;

        let referenced = image.referenced_imports();
        if let Some(missing) = referenced.iter().find(|name| !resolved.contains_key(**name)) {
            return Err(JitError::UnresolvedSymbol {
                key,
                name: missing.to_string(),
            });
        }

        let mut builder = JITBuilder::with_isa(self.target.owned_isa(), default_libcall_names());
        for (name, symbol) in &resolved {
            builder.symbol(name.clone(), symbol.address.as_ptr());
        }
        let mut module = JITModule::new(builder);

        let symbols = match link_into(&mut module, key, &image) {
            Ok(symbols) => symbols,
            Err(err) => {
                // Nothing from this module has run yet.
                unsafe { module.free_memory() };
                return Err(err);
            }
        };

        let dependencies: BTreeSet<ModuleKey> = {
            let index = self.index.read();
            referenced
                .iter()
                .filter_map(|name| {
                    let symbol = resolved.get(*name)?;
                    index.owner_of(name, symbol.address)
                })
                .collect()
        };

        tracing::debug!(
            %key,
            module = %image.module_name,
            symbols = symbols.len(),
            dependencies = ?dependencies,
            "linked module"
        );

        self.index.write().insert_module(key, symbols);
        self.objects.insert(
            key,
            LinkedObject {
                name: image.module_name,
                module,
                dependencies,
            },
        );
        Ok(())
    }

    /// Unpublishes the module's symbols and frees its memory.
    pub fn remove_object(&mut self, key: ModuleKey) -> Result<(), JitError> {
        if !self.objects.contains_key(&key) {
            return Err(JitError::UnknownModule(key));
        }

        let dependents = self.dependents_of(key);
        if !dependents.is_empty() {
            return Err(JitError::DanglingDependency { key, dependents });
        }

        let Some(object) = self.objects.remove(&key) else {
            return Err(JitError::UnknownModule(key));
        };
        self.index.write().remove_module(key);
        tracing::debug!(%key, module = %object.name, "freeing module memory");

        // No live module links against this one and its symbols are gone from the index.
        unsafe { object.module.free_memory() };
        Ok(())
    }

    pub fn find_symbol(
        &self,
        name: &str,
        exported_only: bool,
    ) -> Result<Option<JitSymbol>, ResolutionError> {
        Ok(self
            .index
            .read()
            .find(name, exported_only)?
            .map(|(_, symbol)| symbol))
    }

    pub fn find_symbol_in(&self, key: ModuleKey, name: &str, exported_only: bool) -> Option<JitSymbol> {
        self.index.read().find_in(key, name, exported_only)
    }

    pub fn symbols_of(&self, key: ModuleKey) -> Vec<(String, JitSymbol)> {
        self.index.read().symbols_of(key)
    }

    pub fn contains(&self, key: ModuleKey) -> bool {
        self.objects.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = ModuleKey> + '_ {
        self.objects.keys().copied()
    }

    pub fn module_name(&self, key: ModuleKey) -> Option<&str> {
        self.objects.get(&key).map(|object| object.name.as_str())
    }

    /// Modules `key` was linked against.
    pub fn dependencies_of(&self, key: ModuleKey) -> Option<Vec<ModuleKey>> {
        self.objects
            .get(&key)
            .map(|object| object.dependencies.iter().copied().collect())
    }

    /// Live modules linked against `key`.
    pub fn dependents_of(&self, key: ModuleKey) -> Vec<ModuleKey> {
        self.objects
            .iter()
            .filter(|(other, object)| **other != key && object.dependencies.contains(&key))
            .map(|(other, _)| *other)
            .collect()
    }
}

impl Drop for ObjectLinkingLayer {
    fn drop(&mut self) {
        // Newest first, so dependents go before the modules they were linked against.
        while let Some((key, object)) = self.objects.pop_last() {
            self.index.write().remove_module(key);
            tracing::debug!(%key, module = %object.name, "freeing module memory on shutdown");
            // SAFETY: addresses handed out by this layer are only valid while it lives, and the
            // layer is going away.
            unsafe { object.module.free_memory() };
        }
    }
}

impl std::fmt::Debug for ObjectLinkingLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLinkingLayer")
            .field("target", &self.target)
            .field("modules", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn resolve_imports(
    resolver: &dyn SymbolResolver,
    image: &ObjectImage,
) -> Result<BTreeMap<String, JitSymbol>, JitError> {
    let imports = image.imports();
    if imports.is_empty() {
        return Ok(BTreeMap::new());
    }

    let flags = resolver.lookup_flags(&imports);
    let resolvable: Vec<&str> = flags.keys().map(String::as_str).collect();
    tracing::trace!(
        module = %image.module_name,
        imports = imports.len(),
        resolvable = resolvable.len(),
        "resolving imports"
    );
    Ok(resolver.lookup(&resolvable)?)
}

fn link_into(
    module: &mut JITModule,
    key: ModuleKey,
    image: &ObjectImage,
) -> Result<Vec<(String, JitSymbol)>, JitError> {
    let link_err = |message: String| JitError::Link { key, message };

    for (index, func) in image.functions.iter() {
        let id = module
            .declare_function(&func.name, func.linkage, &func.signature)
            .map_err(|e| link_err(e.to_string()))?;
        if id.as_u32() != index.as_u32() {
            return Err(link_err(format!("`{}` declared out of order", func.name)));
        }
    }
    for (index, data) in image.data.iter() {
        let id = module
            .declare_data(&data.name, data.linkage, data.writable, false)
            .map_err(|e| link_err(e.to_string()))?;
        if id.as_u32() != index.as_u32() {
            return Err(link_err(format!("`{}` declared out of order", data.name)));
        }
    }

    for (index, func) in image.functions.iter() {
        let Some(body) = &func.code else { continue };
        module
            .define_function_bytes(
                FuncId::from_u32(index.as_u32()),
                &body.func,
                body.alignment,
                &body.bytes,
                &body.relocs,
            )
            .map_err(|e| link_err(format!("defining `{}`: {}", func.name, e)))?;
    }
    for (index, data) in image.data.iter() {
        let Some(init) = &data.init else { continue };
        let mut description = DataDescription::new();
        match init {
            DataInit::Zeroed(size) => description.define_zeroinit(*size),
            DataInit::Bytes(bytes) => description.define(bytes.clone().into_boxed_slice()),
        }
        module
            .define_data(DataId::from_u32(index.as_u32()), &description)
            .map_err(|e| link_err(format!("defining `{}`: {}", data.name, e)))?;
    }

    module
        .finalize_definitions()
        .map_err(|e| link_err(e.to_string()))?;

    let mut symbols = Vec::new();
    for (index, func) in image.functions.iter() {
        if func.code.is_none() {
            continue;
        }
        let address = module.get_finalized_function(FuncId::from_u32(index.as_u32()));
        symbols.push((
            func.name.clone(),
            JitSymbol::new(
                SymbolAddress::from_ptr(address),
                SymbolFlags::from_linkage(func.linkage, true),
            ),
        ));
    }
    for (index, data) in image.data.iter() {
        if data.init.is_none() {
            continue;
        }
        let (address, _) = module.get_finalized_data(DataId::from_u32(index.as_u32()));
        symbols.push((
            data.name.clone(),
            JitSymbol::new(
                SymbolAddress::from_ptr(address),
                SymbolFlags::from_linkage(data.linkage, false),
            ),
        ));
    }
    Ok(symbols)
}
