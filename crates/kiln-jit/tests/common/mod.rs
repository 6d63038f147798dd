#![allow(dead_code)]

use cranelift::prelude::*;
use kiln_core::{DataInit, IrModule, JitConfig, Linkage, TargetDescriptor};

pub fn host_target() -> TargetDescriptor {
    TargetDescriptor::host(&JitConfig::default()).unwrap()
}

pub fn signature(target: &TargetDescriptor, params: usize) -> Signature {
    let mut sig = target.make_signature();
    sig.params
        .extend(std::iter::repeat(AbiParam::new(types::I64)).take(params));
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

fn entry_block(b: &mut FunctionBuilder<'_>) -> Vec<Value> {
    let block = b.create_block();
    b.append_block_params_for_function_params(block);
    b.switch_to_block(block);
    b.block_params(block).to_vec()
}

/// `add(a, b) = a + b`, exported.
pub fn adder(target: &TargetDescriptor) -> IrModule {
    let mut module = IrModule::new("adder");
    let add = module
        .declare_function("add", Linkage::Export, signature(target, 2))
        .unwrap();
    module
        .define_function_with(add, |b, _| {
            let params = entry_block(b);
            let sum = b.ins().iadd(params[0], params[1]);
            b.ins().return_(&[sum]);
            Ok(())
        })
        .unwrap();
    module
}

/// A module named `name` whose only function `symbol` returns `value`.
pub fn constant(target: &TargetDescriptor, name: &str, symbol: &str, linkage: Linkage, value: i64) -> IrModule {
    let mut module = IrModule::new(name);
    let func = module
        .declare_function(symbol, linkage, signature(target, 0))
        .unwrap();
    module
        .define_function_with(func, |b, _| {
            entry_block(b);
            let result = b.ins().iconst(types::I64, value);
            b.ins().return_(&[result]);
            Ok(())
        })
        .unwrap();
    module
}

/// Imports `callee` with `params` i64 arguments and exports `caller`, which forwards its own
/// arguments to it.
pub fn forwarder(
    target: &TargetDescriptor,
    name: &str,
    caller: &str,
    callee: &str,
    params: usize,
) -> IrModule {
    let mut module = IrModule::new(name);
    let imported = module
        .declare_function(callee, Linkage::Import, signature(target, params))
        .unwrap();
    let exported = module
        .declare_function(caller, Linkage::Export, signature(target, params))
        .unwrap();
    module
        .define_function_with(exported, |b, m| {
            let callee = m.declare_func_in_func(imported, b.func);
            let args = entry_block(b);
            let call = b.ins().call(callee, &args);
            let result = b.inst_results(call)[0];
            b.ins().return_(&[result]);
            Ok(())
        })
        .unwrap();
    module
}

/// Exports the data object `counter` holding `value` and a function `read_counter` loading it.
pub fn counter(target: &TargetDescriptor, value: i64) -> IrModule {
    let mut module = IrModule::new("counter");
    let data = module
        .declare_data("counter", Linkage::Export, true)
        .unwrap();
    module
        .define_data(data, DataInit::Bytes(value.to_ne_bytes().to_vec()))
        .unwrap();

    let read = module
        .declare_function("read_counter", Linkage::Export, signature(target, 0))
        .unwrap();
    let pointer = target.pointer_type();
    module
        .define_function_with(read, |b, m| {
            let global = m.declare_data_in_func(data, b.func);
            entry_block(b);
            let address = b.ins().global_value(pointer, global);
            let loaded = b.ins().load(types::I64, MemFlags::trusted(), address, 0);
            b.ins().return_(&[loaded]);
            Ok(())
        })
        .unwrap();
    module
}

/// Reinterprets a JIT address as `extern "C" fn() -> i64`.
pub fn as_fn0(address: *const u8) -> extern "C" fn() -> i64 {
    unsafe { std::mem::transmute(address) }
}

pub fn as_fn1(address: *const u8) -> extern "C" fn(i64) -> i64 {
    unsafe { std::mem::transmute(address) }
}

pub fn as_fn2(address: *const u8) -> extern "C" fn(i64, i64) -> i64 {
    unsafe { std::mem::transmute(address) }
}
