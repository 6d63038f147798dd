use cranelift::prelude::*;
use kiln_core::{IrModule, JitConfig, Linkage, TargetDescriptor};

pub(crate) fn host_target() -> TargetDescriptor {
    TargetDescriptor::host(&JitConfig::default()).unwrap()
}

/// `fn() -> i64`
pub(crate) fn unit_signature(target: &TargetDescriptor) -> Signature {
    let mut sig = target.make_signature();
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

/// `fn(i64, i64) -> i64`
pub(crate) fn binary_signature(target: &TargetDescriptor) -> Signature {
    let mut sig = unit_signature(target);
    sig.params.push(AbiParam::new(types::I64));
    sig.params.push(AbiParam::new(types::I64));
    sig
}

/// Exports `add(a, b)` and `mul(a, b)`.
pub(crate) fn math_module(target: &TargetDescriptor) -> IrModule {
    let mut module = IrModule::new("math");
    let add = module
        .declare_function("add", Linkage::Export, binary_signature(target))
        .unwrap();
    let mul = module
        .declare_function("mul", Linkage::Export, binary_signature(target))
        .unwrap();

    module
        .define_function_with(add, |b, _| {
            let (x, y) = entry_params(b);
            let sum = b.ins().iadd(x, y);
            b.ins().return_(&[sum]);
            Ok(())
        })
        .unwrap();
    module
        .define_function_with(mul, |b, _| {
            let (x, y) = entry_params(b);
            let product = b.ins().imul(x, y);
            b.ins().return_(&[product]);
            Ok(())
        })
        .unwrap();
    module
}

/// Imports `add` and exports `add_twice(a, b) = add(add(a, b), b)`.
pub(crate) fn client_module(target: &TargetDescriptor) -> IrModule {
    let mut module = IrModule::new("client");
    let add = module
        .declare_function("add", Linkage::Import, binary_signature(target))
        .unwrap();
    let add_twice = module
        .declare_function("add_twice", Linkage::Export, binary_signature(target))
        .unwrap();

    module
        .define_function_with(add_twice, |b, m| {
            let callee = m.declare_func_in_func(add, b.func);
            let (x, y) = entry_params(b);
            let call = b.ins().call(callee, &[x, y]);
            let once = b.inst_results(call)[0];
            let call = b.ins().call(callee, &[once, y]);
            let twice = b.inst_results(call)[0];
            b.ins().return_(&[twice]);
            Ok(())
        })
        .unwrap();
    module
}

fn entry_params(b: &mut FunctionBuilder<'_>) -> (Value, Value) {
    let block = b.create_block();
    b.append_block_params_for_function_params(block);
    b.switch_to_block(block);
    let params = b.block_params(block);
    (params[0], params[1])
}
