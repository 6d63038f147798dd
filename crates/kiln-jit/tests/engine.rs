mod common;

use std::sync::{Arc, Mutex};

use common::*;
use kiln_core::{JitConfig, Linkage};
use kiln_jit::{JitEngine, SymbolMap};
use pretty_assertions::assert_eq;

fn isolated_engine() -> JitEngine {
    JitEngine::with_process_symbols(host_target(), Arc::new(SymbolMap::new())).unwrap()
}

#[test]
fn test_add_find_call_remove() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();
    assert!(jit.find_symbol("add").is_none());

    let key = jit.add_module(adder(&target));
    let add = jit.find_symbol("add").expect("add is exported");
    assert!(add.flags.exported);
    assert!(add.flags.callable);
    assert_eq!(as_fn2(add.address.as_ptr())(2, 3), 5);

    jit.remove_module(key);
    assert!(jit.find_symbol("add").is_none());
    assert!(!jit.contains(key));
}

#[test]
fn test_handles_are_distinct_and_never_reused() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let keys: Vec<_> = (0..3)
        .map(|i| {
            let symbol = format!("value{}", i);
            jit.add_module(constant(&target, &symbol, &symbol, Linkage::Export, i))
        })
        .collect();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(jit.live_modules(), keys);

    for (i, key) in keys.iter().enumerate() {
        let symbol = jit.find_symbol(&format!("value{}", i)).unwrap();
        assert_eq!(as_fn0(symbol.address.as_ptr())(), i as i64);
        assert_eq!(jit.module_symbols(*key).len(), 1);
    }

    jit.remove_module(keys[2]);
    let next = jit.add_module(constant(&target, "later", "later", Linkage::Export, 9));
    assert!(next > keys[2]);
    assert_eq!(jit.live_modules(), vec![keys[0], keys[1], next]);
}

#[test]
fn test_symbols_stay_visible_while_more_modules_arrive() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(adder(&target));
    let before = jit.find_symbol("add");
    jit.add_module(constant(&target, "other", "other", Linkage::Export, 1));
    assert_eq!(jit.find_symbol("add"), before);
}

#[test]
fn test_cross_module_call() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(adder(&target));
    jit.add_module(forwarder(&target, "client", "call_add", "add", 2));

    let call_add = jit.find_symbol("call_add").unwrap();
    assert_eq!(as_fn2(call_add.address.as_ptr())(40, 2), 42);
}

#[test]
fn test_private_helper_is_linkable_but_not_findable() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let m1 = jit.add_module(constant(&target, "m1", "helper", Linkage::Local, 42));
    let m2 = jit.add_module(forwarder(&target, "m2", "use_helper", "helper", 0));

    assert!(jit.find_symbol("helper").is_none());
    let use_helper = jit.find_symbol("use_helper").unwrap();
    assert_eq!(as_fn0(use_helper.address.as_ptr())(), 42);

    jit.remove_module(m2);
    jit.remove_module(m1);
    assert!(jit.live_modules().is_empty());
}

extern "C" fn triple(x: i64) -> i64 {
    x * 3
}

#[test]
fn test_injected_process_symbol() {
    let target = host_target();
    let process = SymbolMap::new()
        .with_layout(*target.data_layout())
        .with_symbol("triple", triple as *const u8);
    let mut jit = JitEngine::with_process_symbols(target.clone(), Arc::new(process)).unwrap();

    jit.add_module(forwarder(&target, "runtime_user", "tripled", "triple", 1));
    let tripled = jit.find_symbol("tripled").unwrap();
    assert_eq!(as_fn1(tripled.address.as_ptr())(14), 42);

    // Host symbols are for linking only.
    assert!(jit.find_symbol("triple").is_none());
}

#[cfg(unix)]
#[test]
fn test_host_process_symbol() {
    let mut jit = JitEngine::new(host_target()).unwrap();
    let target = jit.target().clone();

    jit.add_module(forwarder(&target, "libc_user", "absolute", "labs", 1));
    let absolute = jit.find_symbol("absolute").unwrap();
    assert_eq!(as_fn1(absolute.address.as_ptr())(-17), 17);
    assert!(jit.find_symbol("labs").is_none());
}

#[test]
fn test_compiled_module_shadows_process_symbol() {
    let target = host_target();
    let process = SymbolMap::new()
        .with_layout(*target.data_layout())
        .with_symbol("seven", triple as *const u8);
    let mut jit = JitEngine::with_process_symbols(target.clone(), Arc::new(process)).unwrap();

    jit.add_module(constant(&target, "provider", "seven", Linkage::Export, 7));
    jit.add_module(forwarder(&target, "consumer", "get_seven", "seven", 0));
    let get_seven = jit.find_symbol("get_seven").unwrap();
    assert_eq!(as_fn0(get_seven.address.as_ptr())(), 7);
}

#[test]
fn test_data_object_is_findable() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(counter(&target, 1234));
    let data = jit.find_symbol("counter").unwrap();
    assert!(!data.flags.callable);
    let stored = unsafe { std::ptr::read_unaligned(data.address.as_ptr() as *const i64) };
    assert_eq!(stored, 1234);

    let read = jit.find_symbol("read_counter").unwrap();
    assert_eq!(as_fn0(read.address.as_ptr())(), 1234);
}

#[test]
fn test_strong_definition_beats_weak() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(constant(&target, "weak", "pick", Linkage::Preemptible, 1));
    let weak = jit.find_symbol("pick").unwrap();
    assert!(weak.flags.weak);

    jit.add_module(constant(&target, "strong", "pick", Linkage::Export, 2));
    let strong = jit.find_symbol("pick").unwrap();
    assert!(!strong.flags.weak);
    assert_eq!(as_fn0(strong.address.as_ptr())(), 2);
}

#[test]
fn test_unreferenced_unresolved_import_is_accepted() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let mut module = adder(&target);
    module
        .declare_function("never_called", Linkage::Import, signature(&target, 0))
        .unwrap();
    let key = jit.add_module(module);
    assert!(jit.contains(key));
}

#[test]
fn test_verbatim_name_skips_mangling() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(adder(&target));
    let mangled = kiln_core::Mangler::mangle("add", target.data_layout());
    let verbatim = format!("\x01{}", mangled);
    assert_eq!(jit.find_symbol(&verbatim), jit.find_symbol("add"));
}

#[test]
fn test_engine_behind_a_lock() {
    let jit = Arc::new(Mutex::new(isolated_engine()));
    let target = jit.lock().unwrap().target().clone();

    let worker = {
        let jit = Arc::clone(&jit);
        let module = adder(&target);
        std::thread::spawn(move || jit.lock().unwrap().add_module(module))
    };
    let key = worker.join().unwrap();

    let engine = jit.lock().unwrap();
    assert!(engine.contains(key));
    assert!(engine.find_symbol("add").is_some());
}

#[test]
#[should_panic(expected = "is not a live module")]
fn test_double_remove_is_fatal() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let key = jit.add_module(adder(&target));
    jit.remove_module(key);
    jit.remove_module(key);
}

#[test]
#[should_panic(expected = "is still used by")]
fn test_removing_a_dependency_is_fatal() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let provider = jit.add_module(adder(&target));
    jit.add_module(forwarder(&target, "client", "call_add", "add", 2));
    jit.remove_module(provider);
}

#[test]
#[should_panic(expected = "which no module or host symbol provides")]
fn test_unresolved_reference_is_fatal() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();
    jit.add_module(forwarder(&target, "orphan", "call_missing", "missing", 0));
}

#[test]
#[should_panic(expected = "which no module or host symbol provides")]
fn test_process_symbols_can_be_disabled() {
    let config = JitConfig {
        load_process_symbols: false,
        ..JitConfig::default()
    };
    let mut jit = JitEngine::from_config(&config).unwrap();
    let target = jit.target().clone();
    jit.add_module(forwarder(&target, "libc_user", "absolute", "labs", 1));
}

#[test]
#[should_panic(expected = "is defined by more than one module")]
fn test_duplicate_strong_exports_are_fatal_on_lookup() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(constant(&target, "first", "dup", Linkage::Export, 1));
    jit.add_module(constant(&target, "second", "dup", Linkage::Export, 2));
    jit.find_symbol("dup");
}

#[test]
#[should_panic(expected = "is defined by more than one module")]
fn test_duplicate_strong_exports_are_fatal_when_linking() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    jit.add_module(constant(&target, "first", "dup", Linkage::Export, 1));
    jit.add_module(constant(&target, "second", "dup", Linkage::Export, 2));
    jit.add_module(forwarder(&target, "user", "call_dup", "dup", 0));
}

#[test]
#[should_panic(expected = "adding module `broken`")]
fn test_incomplete_module_is_fatal() {
    let mut jit = isolated_engine();
    let target = jit.target().clone();

    let mut module = kiln_core::IrModule::new("broken");
    module
        .declare_function("no_body", Linkage::Export, signature(&target, 0))
        .unwrap();
    jit.add_module(module);
}
