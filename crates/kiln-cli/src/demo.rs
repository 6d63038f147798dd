use anyhow::Result;
use cranelift::prelude::*;
use kiln_core::{IrModule, JitConfig, Linkage, TargetDescriptor};
use kiln_jit::JitEngine;

pub enum Status {
    Passed,
    Failed,
    Skipped,
}

pub struct Outcome {
    pub name: &'static str,
    expected: String,
    actual: Option<String>,
    skip_reason: Option<&'static str>,
}

impl Outcome {
    fn checked<T: ToString>(name: &'static str, expected: T, actual: Option<T>) -> Self {
        Self {
            name,
            expected: expected.to_string(),
            actual: actual.map(|value| value.to_string()),
            skip_reason: None,
        }
    }

    fn skipped(name: &'static str, reason: &'static str) -> Self {
        Self {
            name,
            expected: String::new(),
            actual: None,
            skip_reason: Some(reason),
        }
    }

    pub fn status(&self) -> Status {
        match (self.skip_reason, &self.actual) {
            (Some(_), _) => Status::Skipped,
            (None, Some(actual)) if *actual == self.expected => Status::Passed,
            _ => Status::Failed,
        }
    }

    pub fn detail(&self) -> String {
        match (self.skip_reason, &self.actual) {
            (Some(reason), _) => reason.to_string(),
            (None, Some(actual)) => format!("expected {}, got {}", self.expected, actual),
            (None, None) => format!("expected {}, symbol not found", self.expected),
        }
    }
}

/// Runs every scenario on a fresh engine built from `config`.
pub fn run(config: &JitConfig) -> Result<Vec<Outcome>> {
    let mut jit = JitEngine::from_config(config)?;
    let target = jit.target().clone();

    let mut outcomes = Vec::new();

    let key = jit.add_module(adder(&target)?);
    let sum = jit.find_symbol("add").map(|add| {
        let add: extern "C" fn(i64, i64) -> i64 = unsafe { std::mem::transmute(add.address.as_ptr()) };
        add(2, 3)
    });
    outcomes.push(Outcome::checked("add(2, 3)", 5, sum));
    jit.remove_module(key);
    let lookup = match jit.find_symbol("add") {
        Some(_) => "found",
        None => "not found",
    };
    outcomes.push(Outcome::checked("add after removal", "not found", Some(lookup)));

    let helper_key = jit.add_module(helper(&target)?);
    let client = jit.add_module(caller(&target, "client", "call_helper", "helper", 0)?);
    let answer = jit.find_symbol("call_helper").map(|call| {
        let call: extern "C" fn() -> i64 = unsafe { std::mem::transmute(call.address.as_ptr()) };
        call()
    });
    outcomes.push(Outcome::checked("call_helper()", 42, answer));
    jit.remove_module(client);
    jit.remove_module(helper_key);

    outcomes.push(host_scenario(&mut jit, config)?);
    Ok(outcomes)
}

fn host_scenario(jit: &mut JitEngine, config: &JitConfig) -> Result<Outcome> {
    const NAME: &str = "labs(-17) via host";
    if !config.load_process_symbols {
        return Ok(Outcome::skipped(NAME, "process symbols disabled"));
    }
    if cfg!(not(unix)) {
        return Ok(Outcome::skipped(NAME, "no libc in the process image"));
    }

    let target = jit.target().clone();
    let key = jit.add_module(caller(&target, "host_user", "absolute", "labs", 1)?);
    let absolute = jit.find_symbol("absolute").map(|absolute| {
        let absolute: extern "C" fn(i64) -> i64 =
            unsafe { std::mem::transmute(absolute.address.as_ptr()) };
        absolute(-17)
    });
    jit.remove_module(key);
    Ok(Outcome::checked(NAME, 17, absolute))
}

fn signature(target: &TargetDescriptor, params: usize) -> Signature {
    let mut sig = target.make_signature();
    for _ in 0..params {
        sig.params.push(AbiParam::new(types::I64));
    }
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

fn adder(target: &TargetDescriptor) -> Result<IrModule> {
    let mut module = IrModule::new("adder");
    let add = module.declare_function("add", Linkage::Export, signature(target, 2))?;
    module.define_function_with(add, |b, _| {
        let block = b.create_block();
        b.append_block_params_for_function_params(block);
        b.switch_to_block(block);
        let (x, y) = (b.block_params(block)[0], b.block_params(block)[1]);
        let sum = b.ins().iadd(x, y);
        b.ins().return_(&[sum]);
        Ok(())
    })?;
    Ok(module)
}

/// Module-private `helper() -> 42`.
fn helper(target: &TargetDescriptor) -> Result<IrModule> {
    let mut module = IrModule::new("helper");
    let helper = module.declare_function("helper", Linkage::Local, signature(target, 0))?;
    module.define_function_with(helper, |b, _| {
        let block = b.create_block();
        b.switch_to_block(block);
        let answer = b.ins().iconst(types::I64, 42);
        b.ins().return_(&[answer]);
        Ok(())
    })?;
    Ok(module)
}

/// Exports `name`, which passes its arguments straight to the imported `callee`.
fn caller(
    target: &TargetDescriptor,
    module_name: &str,
    name: &str,
    callee: &str,
    params: usize,
) -> Result<IrModule> {
    let mut module = IrModule::new(module_name);
    let import = module.declare_function(callee, Linkage::Import, signature(target, params))?;
    let export = module.declare_function(name, Linkage::Export, signature(target, params))?;
    module.define_function_with(export, |b, m| {
        let callee = m.declare_func_in_func(import, b.func);
        let block = b.create_block();
        b.append_block_params_for_function_params(block);
        b.switch_to_block(block);
        let args = b.block_params(block).to_vec();
        let call = b.ins().call(callee, &args);
        let result = b.inst_results(call)[0];
        b.ins().return_(&[result]);
        Ok(())
    })?;
    Ok(module)
}
