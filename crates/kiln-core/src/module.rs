/*! Self-contained compilation units handed to the JIT.
 *
 * A module is an ordered symbol table: every function and data object it defines or imports gets a
 * module-local index, and function bodies refer to other symbols through Cranelift user external
 * names `(namespace, index)` pointing into that table. Keeping references index-based means a
 * module can be built without knowing where, or whether, its imports will eventually live.
 */

use cranelift_codegen::ir::{self, immediates::Imm64, Signature, UserExternalName, UserFuncName};
use cranelift_entity::{entity_impl, PrimaryMap};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::Linkage;
use indexmap::IndexMap;

use crate::{IrError, Result};

/// External-name namespace used for function references.
pub const FUNCTION_NAMESPACE: u32 = 0;
/// External-name namespace used for data references.
pub const DATA_NAMESPACE: u32 = 1;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncIndex(u32);
entity_impl!(FuncIndex, "func");

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataIndex(u32);
entity_impl!(DataIndex, "data");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleSymbol {
    Function(FuncIndex),
    Data(DataIndex),
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub linkage: Linkage,
    pub signature: Signature,
    pub body: Option<ir::Function>,
}

impl FunctionDecl {
    pub fn is_defined(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DataDecl {
    pub name: String,
    pub linkage: Linkage,
    pub writable: bool,
    pub init: Option<DataInit>,
}

impl DataDecl {
    pub fn is_defined(&self) -> bool {
        self.init.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataInit {
    Zeroed(usize),
    Bytes(Vec<u8>),
}

impl DataInit {
    pub fn size(&self) -> usize {
        match self {
            DataInit::Zeroed(size) => *size,
            DataInit::Bytes(bytes) => bytes.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IrModule {
    name: String,
    functions: PrimaryMap<FuncIndex, FunctionDecl>,
    data: PrimaryMap<DataIndex, DataDecl>,
    names: IndexMap<String, ModuleSymbol>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: PrimaryMap::new(),
            data: PrimaryMap::new(),
            names: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        linkage: Linkage,
        signature: Signature,
    ) -> Result<FuncIndex> {
        let name = self.claim_name(name.into())?;
        let index = self.functions.push(FunctionDecl {
            name: name.clone(),
            linkage,
            signature,
            body: None,
        });
        self.names.insert(name, ModuleSymbol::Function(index));
        Ok(index)
    }

    pub fn declare_data(
        &mut self,
        name: impl Into<String>,
        linkage: Linkage,
        writable: bool,
    ) -> Result<DataIndex> {
        let name = self.claim_name(name.into())?;
        let index = self.data.push(DataDecl {
            name: name.clone(),
            linkage,
            writable,
            init: None,
        });
        self.names.insert(name, ModuleSymbol::Data(index));
        Ok(index)
    }

    fn claim_name(&self, name: String) -> Result<String> {
        if self.names.contains_key(&name) {
            return Err(IrError::DuplicateSymbol {
                module: self.name.clone(),
                name,
            });
        }
        Ok(name)
    }

    pub fn define_function(&mut self, index: FuncIndex, func: ir::Function) -> Result<()> {
        let decl = self
            .functions
            .get_mut(index)
            .ok_or_else(|| IrError::UnknownSymbol(index.to_string()))?;

        if !decl.linkage.is_definable() {
            return Err(IrError::InvalidImportDefinition(decl.name.clone()));
        }
        if decl.body.is_some() {
            return Err(IrError::AlreadyDefined(decl.name.clone()));
        }
        if func.signature != decl.signature {
            return Err(IrError::SignatureMismatch(decl.name.clone()));
        }

        decl.body = Some(func);
        Ok(())
    }

    /// Emits a body for `index` through a `FunctionBuilder`; blocks are sealed afterwards.
    pub fn define_function_with<F>(&mut self, index: FuncIndex, build: F) -> Result<()>
    where
        F: FnOnce(&mut FunctionBuilder<'_>, &IrModule) -> Result<()>,
    {
        let signature = self
            .functions
            .get(index)
            .map(|decl| decl.signature.clone())
            .ok_or_else(|| IrError::UnknownSymbol(index.to_string()))?;

        let mut func = ir::Function::with_name_signature(
            UserFuncName::user(FUNCTION_NAMESPACE, index.as_u32()),
            signature,
        );
        let mut builder_context = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut func, &mut builder_context);
        build(&mut builder, self)?;
        builder.seal_all_blocks();
        builder.finalize();

        self.define_function(index, func)
    }

    pub fn define_data(&mut self, index: DataIndex, init: DataInit) -> Result<()> {
        let decl = self
            .data
            .get_mut(index)
            .ok_or_else(|| IrError::UnknownSymbol(index.to_string()))?;

        if !decl.linkage.is_definable() {
            return Err(IrError::InvalidImportDefinition(decl.name.clone()));
        }
        if decl.init.is_some() {
            return Err(IrError::AlreadyDefined(decl.name.clone()));
        }

        decl.init = Some(init);
        Ok(())
    }

    /// Makes `callee` callable from `func`.
    pub fn declare_func_in_func(&self, callee: FuncIndex, func: &mut ir::Function) -> ir::FuncRef {
        let decl = &self.functions[callee];
        let signature = func.import_signature(decl.signature.clone());
        let name_ref = func.declare_imported_user_function(UserExternalName::new(
            FUNCTION_NAMESPACE,
            callee.as_u32(),
        ));
        func.import_function(ir::ExtFuncData {
            name: ir::ExternalName::user(name_ref),
            signature,
            colocated: decl.linkage.is_final(),
        })
    }

    /// Makes the address of `data` available in `func` as a global value.
    pub fn declare_data_in_func(&self, data: DataIndex, func: &mut ir::Function) -> ir::GlobalValue {
        let decl = &self.data[data];
        let name_ref = func
            .declare_imported_user_function(UserExternalName::new(DATA_NAMESPACE, data.as_u32()));
        func.create_global_value(ir::GlobalValueData::Symbol {
            name: ir::ExternalName::user(name_ref),
            offset: Imm64::new(0),
            colocated: decl.linkage.is_final(),
            tls: false,
        })
    }

    pub fn function(&self, index: FuncIndex) -> Option<&FunctionDecl> {
        self.functions.get(index)
    }

    pub fn data_object(&self, index: DataIndex) -> Option<&DataDecl> {
        self.data.get(index)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncIndex, &FunctionDecl)> {
        self.functions.iter()
    }

    pub fn data_objects(&self) -> impl Iterator<Item = (DataIndex, &DataDecl)> {
        self.data.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleSymbol> {
        self.names.get(name).copied()
    }

    /// Name behind a `(namespace, index)` external reference.
    pub fn symbol_name(&self, name: &UserExternalName) -> Option<&str> {
        match name.namespace {
            FUNCTION_NAMESPACE => self
                .functions
                .get(FuncIndex::from_u32(name.index))
                .map(|decl| decl.name.as_str()),
            DATA_NAMESPACE => self
                .data
                .get(DataIndex::from_u32(name.index))
                .map(|decl| decl.name.as_str()),
            _ => None,
        }
    }

    /// Names of every symbol this module expects another module or the host to provide.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        let functions = self
            .functions
            .values()
            .filter(|decl| !decl.linkage.is_definable())
            .map(|decl| decl.name.as_str());
        let data = self
            .data
            .values()
            .filter(|decl| !decl.linkage.is_definable())
            .map(|decl| decl.name.as_str());
        functions.chain(data)
    }

    /// A module is complete when every definable symbol has a body or initializer.
    pub fn validate(&self) -> Result<()> {
        for decl in self.functions.values() {
            if decl.linkage.is_definable() && !decl.is_defined() {
                return Err(IrError::MissingDefinition(decl.name.clone()));
            }
        }
        for decl in self.data.values() {
            if decl.linkage.is_definable() && !decl.is_defined() {
                return Err(IrError::MissingDefinition(decl.name.clone()));
            }
        }
        Ok(())
    }

    pub fn into_parts(
        self,
    ) -> (
        String,
        PrimaryMap<FuncIndex, FunctionDecl>,
        PrimaryMap<DataIndex, DataDecl>,
    ) {
        (self.name, self.functions, self.data)
    }
}
