use cranelift_codegen::ir::{self, ExternalName, Signature, UserExternalName};
use cranelift_codegen::{FinalizedMachReloc, FinalizedRelocTarget};
use cranelift_entity::PrimaryMap;
use kiln_core::{DataIndex, DataInit, FuncIndex, Linkage, DATA_NAMESPACE, FUNCTION_NAMESPACE};
use std::collections::BTreeSet;

/// Machine code for every function of one module, not yet placed in memory.
///
/// Symbol tables keep the module's declaration order; relocations refer to them by that index.
#[derive(Debug)]
pub struct ObjectImage {
    pub module_name: String,
    pub functions: PrimaryMap<FuncIndex, ImageFunction>,
    pub data: PrimaryMap<DataIndex, ImageData>,
}

#[derive(Debug)]
pub struct ImageFunction {
    /// Linker-visible (mangled) name.
    pub name: String,
    pub linkage: Linkage,
    pub signature: Signature,
    pub code: Option<CompiledBody>,
}

#[derive(Debug)]
pub struct CompiledBody {
    /// The function as compiled; relocations name their targets through its external names.
    pub func: ir::Function,
    pub alignment: u64,
    pub bytes: Vec<u8>,
    pub relocs: Vec<FinalizedMachReloc>,
}

#[derive(Debug)]
pub struct ImageData {
    /// Linker-visible (mangled) name.
    pub name: String,
    pub linkage: Linkage,
    pub writable: bool,
    pub init: Option<DataInit>,
}

impl ObjectImage {
    /// Names this image expects someone else to define.
    pub fn imports(&self) -> Vec<&str> {
        let functions = self
            .functions
            .values()
            .filter(|func| func.code.is_none())
            .map(|func| func.name.as_str());
        let data = self
            .data
            .values()
            .filter(|data| data.init.is_none())
            .map(|data| data.name.as_str());
        functions.chain(data).collect()
    }

    /// Imports that some relocation actually points at.
    pub fn referenced_imports(&self) -> BTreeSet<&str> {
        let mut referenced = BTreeSet::new();
        for body in self.functions.values().filter_map(|func| func.code.as_ref()) {
            for reloc in &body.relocs {
                let FinalizedRelocTarget::ExternalName(ExternalName::User(name_ref)) = &reloc.target
                else {
                    continue;
                };
                let target = &body.func.params.user_named_funcs()[*name_ref];
                if let Some(name) = self.undefined_name(target) {
                    referenced.insert(name);
                }
            }
        }
        referenced
    }

    fn undefined_name(&self, target: &UserExternalName) -> Option<&str> {
        match target.namespace {
            FUNCTION_NAMESPACE => self
                .functions
                .get(FuncIndex::from_u32(target.index))
                .filter(|func| func.code.is_none())
                .map(|func| func.name.as_str()),
            DATA_NAMESPACE => self
                .data
                .get(DataIndex::from_u32(target.index))
                .filter(|data| data.init.is_none())
                .map(|data| data.name.as_str()),
            _ => None,
        }
    }

    pub fn code_size(&self) -> usize {
        self.functions
            .values()
            .filter_map(|func| func.code.as_ref())
            .map(|body| body.bytes.len())
            .sum()
    }
}
