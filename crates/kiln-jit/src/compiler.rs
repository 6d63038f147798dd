use cranelift_codegen::control::ControlPlane;
use cranelift_codegen::ir;
use cranelift_codegen::print_errors::pretty_error;
use cranelift_codegen::Context;
use cranelift_entity::PrimaryMap;
use kiln_core::{IrModule, Mangler, TargetDescriptor};

use crate::error::JitError;
use crate::image::{CompiledBody, ImageData, ImageFunction, ObjectImage};

/// Lowers every function of a module to machine code for one target.
#[derive(Debug, Clone)]
pub struct SimpleCompiler {
    target: TargetDescriptor,
}

impl SimpleCompiler {
    pub fn new(target: TargetDescriptor) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    pub fn compile(&self, module: IrModule) -> Result<ObjectImage, JitError> {
        module.validate()?;

        let layout = *self.target.data_layout();
        let (module_name, functions, data) = module.into_parts();
        let mut ctrl_plane = ControlPlane::default();

        let mut image_functions = PrimaryMap::with_capacity(functions.len());
        for (index, decl) in functions {
            let code = match decl.body {
                Some(func) => Some(self.compile_function(&decl.name, func, &mut ctrl_plane)?),
                None => None,
            };
            let pushed = image_functions.push(ImageFunction {
                name: Mangler::mangle(&decl.name, &layout),
                linkage: decl.linkage,
                signature: decl.signature,
                code,
            });
            debug_assert_eq!(pushed, index);
        }

        let mut image_data = PrimaryMap::with_capacity(data.len());
        for (index, decl) in data {
            let pushed = image_data.push(ImageData {
                name: Mangler::mangle(&decl.name, &layout),
                linkage: decl.linkage,
                writable: decl.writable,
                init: decl.init,
            });
            debug_assert_eq!(pushed, index);
        }

        let image = ObjectImage {
            module_name,
            functions: image_functions,
            data: image_data,
        };
        tracing::debug!(
            module = %image.module_name,
            functions = image.functions.len(),
            data = image.data.len(),
            code_bytes = image.code_size(),
            "compiled module"
        );
        Ok(image)
    }

    fn compile_function(
        &self,
        name: &str,
        func: ir::Function,
        ctrl_plane: &mut ControlPlane,
    ) -> Result<CompiledBody, JitError> {
        let mut context = Context::for_function(func);
        let compiled = context
            .compile(self.target.isa(), ctrl_plane)
            .map_err(|e| JitError::Compile {
                function: name.to_string(),
                message: pretty_error(e.func, e.inner),
            })?;

        let bytes = compiled.code_buffer().to_vec();
        let relocs = compiled.buffer.relocs().to_vec();
        let alignment = u64::from(compiled.buffer.alignment);
        tracing::trace!(function = name, size = bytes.len(), relocs = relocs.len(), "compiled function");

        Ok(CompiledBody {
            func: context.func,
            alignment,
            bytes,
            relocs,
        })
    }
}
