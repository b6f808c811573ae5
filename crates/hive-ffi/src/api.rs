//! Versioned function table
//!
//! Hosts that bind by table instead of by symbol call `hive_bridge_api` once
//! and keep the pointer. Field order is part of the ABI: new entry points go
//! at the end under a new version.

use crate::*;
use hive_bridge::logger::LogCallback;
use hive_bridge::ArrayInfo;
use std::ffi::{c_char, c_void};

pub const HIVE_BRIDGE_API_VERSION: u32 = 1;

type Chain3<R> = extern "C" fn(u64, u64, u64) -> R;
type Chain4<R> = extern "C" fn(u64, u64, u64, u64) -> R;

#[repr(C)]
pub struct HiveBridgeApi {
    pub version: u32,

    pub setup_logger: unsafe extern "C" fn(
        Option<LogCallback>,
        Option<LogCallback>,
        Option<LogCallback>,
        Option<LogCallback>,
    ) -> bool,

    pub create_assembly_context: unsafe extern "C" fn(*const c_char, bool) -> u64,
    pub unload_context: extern "C" fn(u64) -> i32,
    pub retry_pending_unloads: extern "C" fn() -> u32,
    pub load_assembly_from_path: unsafe extern "C" fn(u64, *const c_char) -> u64,

    pub get_classes_from_assembly: extern "C" fn(u64, u64) -> ArrayInfo,
    pub get_methods_from_class: Chain3<ArrayInfo>,
    pub class_get_fields: extern "C" fn(u64, u64, u64, u32) -> ArrayInfo,
    pub get_class_name: Chain3<*mut c_char>,
    pub get_class_namespace: Chain3<*mut c_char>,
    pub get_class_full_name: Chain3<*mut c_char>,
    pub class_is_value_type: Chain3<bool>,
    pub class_is_enum: Chain3<bool>,
    pub class_is_derived_from: extern "C" fn(u64, u64, u64, u64, u64, u64) -> bool,
    pub method_get_by_name: unsafe extern "C" fn(u64, u64, u64, *const c_char, u32) -> u64,
    pub get_method_name: Chain4<*mut c_char>,
    pub method_get_param_count: Chain4<i32>,
    pub method_get_return_type_name: Chain4<*mut c_char>,
    pub field_get_name: Chain4<*mut c_char>,
    pub field_get_type_name: Chain4<*mut c_char>,
    pub field_get_flags: Chain4<u32>,

    pub object_new_gc_handle: extern "C" fn(u64, u64, u64, i32) -> *mut c_void,
    pub object_free_gc_handle: extern "C" fn(*mut c_void) -> bool,
    pub gc_handle_addr_of_pinned_object: extern "C" fn(*mut c_void) -> *const c_void,
    pub string_new_gc_handle: unsafe extern "C" fn(*const c_char, i32) -> *mut c_void,
    pub string_from_gc_handle: extern "C" fn(*mut c_void) -> *mut c_char,
    pub collect_garbage: extern "C" fn() -> u64,

    pub method_invoke: unsafe extern "C" fn(
        u64,
        u64,
        u64,
        u64,
        *mut c_void,
        *const *const c_void,
    ) -> *mut c_void,
    pub field_get_data: unsafe extern "C" fn(u64, u64, u64, u64, *mut c_void) -> *mut c_void,
    pub field_set_data:
        unsafe extern "C" fn(u64, u64, u64, u64, *mut c_void, *const c_void) -> bool,
    pub field_get_value: unsafe extern "C" fn(u64, u64, u64, u64, *mut c_void, *mut c_void) -> bool,
    pub method_unmanaged_callers_only_get_function_pointer: Chain4<*const c_void>,
    pub method_instance_get_function_pointer: Chain4<*const c_void>,

    pub free_int_ptr: extern "C" fn(*mut c_void),
    pub memory_free: extern "C" fn(*mut c_void),
}

static API_V1: HiveBridgeApi = HiveBridgeApi {
    version: HIVE_BRIDGE_API_VERSION,
    setup_logger: hive_setup_logger,
    create_assembly_context: hive_create_assembly_context,
    unload_context: hive_unload_context,
    retry_pending_unloads: hive_retry_pending_unloads,
    load_assembly_from_path: hive_load_assembly_from_path,
    get_classes_from_assembly: hive_get_classes_from_assembly,
    get_methods_from_class: hive_get_methods_from_class,
    class_get_fields: hive_class_get_fields,
    get_class_name: hive_get_class_name,
    get_class_namespace: hive_get_class_namespace,
    get_class_full_name: hive_get_class_full_name,
    class_is_value_type: hive_class_is_value_type,
    class_is_enum: hive_class_is_enum,
    class_is_derived_from: hive_class_is_derived_from,
    method_get_by_name: hive_method_get_by_name,
    get_method_name: hive_get_method_name,
    method_get_param_count: hive_method_get_param_count,
    method_get_return_type_name: hive_method_get_return_type_name,
    field_get_name: hive_field_get_name,
    field_get_type_name: hive_field_get_type_name,
    field_get_flags: hive_field_get_flags,
    object_new_gc_handle: hive_object_new_gc_handle,
    object_free_gc_handle: hive_object_free_gc_handle,
    gc_handle_addr_of_pinned_object: hive_gc_handle_addr_of_pinned_object,
    string_new_gc_handle: hive_string_new_gc_handle,
    string_from_gc_handle: hive_string_from_gc_handle,
    collect_garbage: hive_collect_garbage,
    method_invoke: hive_method_invoke,
    field_get_data: hive_field_get_data,
    field_set_data: hive_field_set_data,
    field_get_value: hive_field_get_value,
    method_unmanaged_callers_only_get_function_pointer:
        hive_method_unmanaged_callers_only_get_function_pointer,
    method_instance_get_function_pointer: hive_method_instance_get_function_pointer,
    free_int_ptr: hive_free_int_ptr,
    memory_free: hive_memory_free,
};

/// Function table for `version`, or NULL when this build does not provide it
#[no_mangle]
pub extern "C" fn hive_bridge_api(version: u32) -> *const HiveBridgeApi {
    if version == HIVE_BRIDGE_API_VERSION {
        &API_V1
    } else {
        tracing::error!("Unable to get bridge API. Message: unsupported version {}", version);
        std::ptr::null()
    }
}
