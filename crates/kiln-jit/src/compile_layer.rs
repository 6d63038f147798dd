use kiln_core::IrModule;

use crate::compiler::SimpleCompiler;
use crate::error::{JitError, ResolutionError};
use crate::key::ModuleKey;
use crate::object_layer::ObjectLinkingLayer;
use crate::symbol::JitSymbol;

/// Turns IR modules into linked code by compiling them eagerly and handing the result down.
#[derive(Debug)]
pub struct CompileLayer {
    object_layer: ObjectLinkingLayer,
    compiler: SimpleCompiler,
}

impl CompileLayer {
    pub fn new(object_layer: ObjectLinkingLayer, compiler: SimpleCompiler) -> Self {
        Self {
            object_layer,
            compiler,
        }
    }

    pub fn add_module(&mut self, key: ModuleKey, module: IrModule) -> Result<(), JitError> {
        let name = module.name().to_string();
        let image = self.compiler.compile(module)?;
        tracing::trace!(%key, module = %name, "handing object to linker");
        self.object_layer.add_object(key, image)
    }

    pub fn remove_module(&mut self, key: ModuleKey) -> Result<(), JitError> {
        self.object_layer.remove_object(key)
    }

    pub fn find_symbol(
        &self,
        name: &str,
        exported_only: bool,
    ) -> Result<Option<JitSymbol>, ResolutionError> {
        self.object_layer.find_symbol(name, exported_only)
    }

    pub fn find_symbol_in(&self, key: ModuleKey, name: &str, exported_only: bool) -> Option<JitSymbol> {
        self.object_layer.find_symbol_in(key, name, exported_only)
    }

    pub fn object_layer(&self) -> &ObjectLinkingLayer {
        &self.object_layer
    }

    pub fn compiler(&self) -> &SimpleCompiler {
        &self.compiler
    }
}
