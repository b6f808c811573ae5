//! Invocation engine tests
//!
//! Tests cover:
//! - Value-type round trips through native buffers
//! - Reference arguments and results as GC handles
//! - Typed reference results passed back across a boundary collection
//! - Exception and panic containment
//! - Instance calls, virtual dispatch and field access
//! - Native entry points and cached delegates

mod common;

use common::{fixture, fixture_with};
use hive_bridge::hive_runtime::{BindingFlags, GcHandle, GcHandleKind, RuntimeError, Value};
use hive_bridge::{BridgeError, BridgeOptions, ErrorCategory, SharedBridge};
use std::ffi::c_void;
use std::ptr;

#[test]
fn test_vector3_identity_round_trip() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let identity = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Identity", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let input: [f32; 3] = [1.0, 2.0, 3.0];
    let args = [input.as_ptr() as *const c_void];
    let out = unsafe {
        fx.bridge
            .invoke_raw(ctx, asm, math, identity, ptr::null(), args.as_ptr())
            .unwrap()
    };
    assert!(!out.is_null());

    let result = unsafe { std::slice::from_raw_parts(out as *const u8, 12) };
    let expected: Vec<u8> = input.iter().flat_map(|v| v.to_ne_bytes()).collect();
    assert_eq!(result, expected.as_slice());

    assert_eq!(fx.bridge.memory().outstanding(), 1);
    assert!(fx.bridge.free_memory(out));
    assert_eq!(fx.bridge.memory().outstanding(), 0);
}

#[test]
fn test_typed_static_call() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let add = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Add", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let result = fx
        .bridge
        .invoke(ctx, asm, math, add, None, &[Value::I32(2), Value::I32(40)])
        .unwrap();
    assert_eq!(result, Value::I32(42));

    let err = fx
        .bridge
        .invoke(ctx, asm, math, add, None, &[Value::I32(2)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentCount { expected: 2, actual: 1, .. }));

    let err = fx
        .bridge
        .invoke(ctx, asm, math, add, None, &[Value::I32(2), Value::F32(1.0)])
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Resolution);
}

#[test]
fn test_reference_arguments_and_results() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let greet = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Greet", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let name = fx.bridge.new_string("Ada", GcHandleKind::Normal);
    let args = [name.as_ptr() as *const c_void];
    let out = unsafe {
        fx.bridge
            .invoke_raw(ctx, asm, math, greet, ptr::null(), args.as_ptr())
            .unwrap()
    };
    let result = GcHandle::from_ptr(out).unwrap();
    assert_eq!(
        fx.bridge.string_value(result).unwrap().as_deref(),
        Some("Hello, Ada")
    );
    assert_eq!(fx.bridge.gc().handles().kind(result).unwrap(), GcHandleKind::Normal);

    fx.bridge.free_gc_handle(result).unwrap();
    fx.bridge.free_gc_handle(name).unwrap();
}

#[test]
fn test_typed_reference_result_as_argument() {
    let mut fx = fixture_with(BridgeOptions::default().with_gc_threshold(0));
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let greet = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Greet", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let name = fx.bridge.new_string("Ada", GcHandleKind::Normal);
    let name_ref = fx.bridge.handle_target(name).unwrap().unwrap();
    let first = fx
        .bridge
        .invoke(ctx, asm, math, greet, None, &[Value::Object(name_ref)])
        .unwrap();
    assert!(first.as_object().is_some());

    // Enough garbage that the next call boundary collects
    for _ in 0..64 {
        let garbage = fx.bridge.new_string(&"x".repeat(256), GcHandleKind::Weak);
        fx.bridge.free_gc_handle(garbage).unwrap();
    }
    let collections = fx.bridge.gc_stats().collections;
    let second = fx
        .bridge
        .invoke(ctx, asm, math, greet, None, &[first.clone()])
        .unwrap();
    assert!(fx.bridge.gc_stats().collections > collections);

    let pinned = fx.bridge.new_gc_handle(second.as_object(), GcHandleKind::Normal);
    assert_eq!(
        fx.bridge.string_value(pinned).unwrap().as_deref(),
        Some("Hello, Hello, Ada")
    );

    // Nothing roots the first result once the call returns
    fx.bridge.collect_garbage();
    let err = fx
        .bridge
        .invoke(ctx, asm, math, greet, None, &[first])
        .unwrap_err();
    assert!(matches!(err, BridgeError::Runtime(RuntimeError::StaleReference)));
    assert_eq!(
        fx.bridge.string_value(pinned).unwrap().as_deref(),
        Some("Hello, Hello, Ada")
    );

    fx.bridge.free_gc_handle(pinned).unwrap();
    fx.bridge.free_gc_handle(name).unwrap();
}

#[test]
fn test_user_exception_is_contained() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let fail = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Fail", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let err = unsafe {
        fx.bridge
            .invoke_raw(ctx, asm, math, fail, ptr::null(), ptr::null())
            .unwrap_err()
    };
    assert_eq!(err.category(), ErrorCategory::UserCode);
    let exception = err.exception().unwrap();
    assert_eq!(exception.class_name(), "System.Reflection.TargetInvocationException");
    assert_eq!(exception.root_cause().message(), "bad input");

    // The bridge keeps working afterwards
    let add = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Add", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();
    assert!(fx
        .bridge
        .invoke(ctx, asm, math, add, None, &[Value::I32(1), Value::I32(1)])
        .is_ok());
}

#[test]
fn test_panic_is_contained() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let explode = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Explode", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let err = fx.bridge.invoke(ctx, asm, math, explode, None, &[]).unwrap_err();
    let root = err.exception().unwrap().root_cause();
    assert_eq!(root.class_name(), "System.Exception");
    assert_eq!(root.message(), "script panicked");
}

#[test]
fn test_instance_calls_and_virtual_dispatch() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let player = fx.class(ctx, asm, "Game.Player");
    let damage = fx
        .bridge
        .find_method_by_name(ctx, asm, player, "Damage", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let handle = fx
        .bridge
        .construct_instance(ctx, asm, player, GcHandleKind::Normal)
        .unwrap();
    let left = fx
        .bridge
        .invoke(ctx, asm, player, damage, Some(handle), &[Value::I32(30)])
        .unwrap();
    assert_eq!(left, Value::I32(70));

    let err = fx
        .bridge
        .invoke(ctx, asm, player, damage, None, &[Value::I32(1)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::InstanceRequired(_)));

    // The base method, resolved through the engine context, dispatches to the override
    let component = fx.class(loaded.core, loaded.core_asm, "Engine.Component");
    let describe = fx
        .bridge
        .find_method_by_name(
            loaded.core,
            loaded.core_asm,
            component,
            "Describe",
            BindingFlags::DEFAULT_LOOKUP,
        )
        .unwrap();
    let text = fx
        .bridge
        .invoke(loaded.core, loaded.core_asm, component, describe, Some(handle), &[])
        .unwrap();
    let text_handle = fx.bridge.new_gc_handle(text.as_object(), GcHandleKind::Normal);
    assert_eq!(
        fx.bridge.string_value(text_handle).unwrap().as_deref(),
        Some("player")
    );
}

#[test]
fn test_construction_capability_errors() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let singleton = fx.class(ctx, asm, "Game.Singleton");
    let vector3 = fx.class(ctx, asm, "Game.Vector3");

    let err = fx
        .bridge
        .construct_instance(ctx, asm, singleton, GcHandleKind::Normal)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Capability);

    let err = fx
        .bridge
        .construct_instance(ctx, asm, vector3, GcHandleKind::Normal)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Capability);
    assert!(fx.bridge.gc().handles().is_empty());
}

#[test]
fn test_field_data_marshaling() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let player = fx.class(ctx, asm, "Game.Player");
    let fields = fx
        .bridge
        .fields_of_type(ctx, asm, player, BindingFlags::PUBLIC | BindingFlags::INSTANCE)
        .unwrap();
    let (health, name, position) = (fields[0], fields[1], fields[2]);

    let handle = fx
        .bridge
        .construct_instance(ctx, asm, player, GcHandleKind::Pinned)
        .unwrap();
    let instance = handle.as_ptr() as *const c_void;

    // Value-type field through native buffers
    let input: [f32; 3] = [4.0, 5.0, 6.0];
    unsafe {
        fx.bridge
            .field_set_data(ctx, asm, player, position, instance, input.as_ptr() as *const c_void)
            .unwrap();
    }
    let out = unsafe {
        fx.bridge
            .field_get_data(ctx, asm, player, position, instance)
            .unwrap()
    };
    let read = unsafe { std::slice::from_raw_parts(out as *const f32, 3) };
    assert_eq!(read, &input);
    assert!(fx.bridge.free_memory(out));

    // Copy into caller storage without allocating
    let mut hp: i32 = 0;
    unsafe {
        fx.bridge
            .field_copy_value(ctx, asm, player, health, instance, &mut hp as *mut i32 as *mut c_void)
            .unwrap();
    }
    assert_eq!(hp, 100);
    assert_eq!(fx.bridge.memory().outstanding(), 0);

    // Reference field through handles
    let text = fx.bridge.new_string("Ada", GcHandleKind::Normal);
    unsafe {
        fx.bridge
            .field_set_data(ctx, asm, player, name, instance, text.as_ptr() as *const c_void)
            .unwrap();
    }
    let mut slot: usize = 0;
    unsafe {
        fx.bridge
            .field_copy_value(ctx, asm, player, name, instance, &mut slot as *mut usize as *mut c_void)
            .unwrap();
    }
    let copy = GcHandle::from_raw(slot).unwrap();
    assert_ne!(copy, text);
    assert_eq!(fx.bridge.string_value(copy).unwrap().as_deref(), Some("Ada"));

    // Pinned instance data: the base class's Enabled flag, then Health at offset 4
    let address = fx.bridge.pinned_address(handle).unwrap();
    let hp = unsafe { (address.add(4) as *const i32).read_unaligned() };
    assert_eq!(hp, 100);
    assert!(fx.bridge.pinned_address(text).is_err());
}

#[test]
fn test_static_fields() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let statics = fx
        .bridge
        .fields_of_type(ctx, asm, math, BindingFlags::PUBLIC | BindingFlags::STATIC)
        .unwrap();
    let count = statics[0];

    fx.bridge
        .field_set_value(ctx, asm, math, count, None, &Value::I32(5))
        .unwrap();
    assert_eq!(
        fx.bridge.field_get_value(ctx, asm, math, count, None).unwrap(),
        Value::I32(5)
    );

    let err = fx
        .bridge
        .field_set_value(ctx, asm, math, count, None, &Value::Bool(true))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Resolution);
}

#[test]
fn test_unmanaged_function_pointer() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let native = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "NativeAdd", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();
    let add = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Add", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let entry = fx
        .bridge
        .unmanaged_function_pointer(ctx, asm, math, native)
        .unwrap();
    let f: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(entry) };
    assert_eq!(f(2, 3), 5);

    let err = fx
        .bridge
        .unmanaged_function_pointer(ctx, asm, math, add)
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotNativeCallable(_)));
}

#[test]
fn test_cached_delegate() {
    let mut fx = fixture();
    let loaded = fx.load();
    let (ctx, asm) = (loaded.scripts, loaded.scripts_asm);
    let math = fx.class(ctx, asm, "Game.MathUtil");
    let add = fx
        .bridge
        .find_method_by_name(ctx, asm, math, "Add", BindingFlags::DEFAULT_LOOKUP)
        .unwrap();

    let shared: &'static SharedBridge = Box::leak(Box::new(SharedBridge::new(fx.bridge)));
    let thunk = shared.instance_function_pointer(ctx, asm, math, add).unwrap();
    assert_eq!(
        shared.instance_function_pointer(ctx, asm, math, add).unwrap(),
        thunk
    );

    let (a, b) = (20i32, 22i32);
    let args = [&a as *const i32 as *const c_void, &b as *const i32 as *const c_void];
    let out = unsafe { ((*thunk).invoke)(thunk, ptr::null_mut(), args.as_ptr()) };
    assert!(!out.is_null());
    assert_eq!(unsafe { *(out as *const i32) }, 42);
    assert!(shared.with(|bridge| Ok(bridge.free_memory(out))).unwrap());
}
