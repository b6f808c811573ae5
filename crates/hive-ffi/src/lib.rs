//! C ABI of the Hive bridge
//!
//! One process-wide [`SharedBridge`] backs every entry point. Each export is
//! its own `catch_unwind` unit: a failure or a panic becomes a zero or null
//! sentinel plus one log line, and nothing unwinds into the host.
//!
//! Bridge options are read from the TOML file named by `HIVE_BRIDGE_CONFIG`
//! when the bridge is first touched. Log lines are dropped until the host
//! calls `hive_setup_logger`.
//!
//! Every pointer handed out (ID arrays, strings, value buffers) belongs to the
//! host and must go back through `hive_memory_free` or `hive_free_int_ptr`.
//! GC handles are released with `hive_object_free_gc_handle`.
//!
//! # Example (C)
//! ```c
//! hive_setup_logger(on_info, on_warn, on_trace, on_error);
//! uint64_t ctx = hive_create_assembly_context("scripts", true);
//! uint64_t asm = hive_load_assembly_from_path(ctx, "scripts/game.toml");
//! ArrayInfo classes = hive_get_classes_from_assembly(ctx, asm);
//! for (uint64_t i = 0; i < classes.length; i++) {
//!     char* name = hive_get_class_full_name(ctx, asm, ((uint64_t*)classes.ptr)[i]);
//!     puts(name);
//!     hive_memory_free(name);
//! }
//! hive_memory_free(classes.ptr);
//! ```

mod api;

pub use api::{hive_bridge_api, HiveBridgeApi, HIVE_BRIDGE_API_VERSION};

use hive_bridge::hive_runtime::{AssemblyBuilder, BindingFlags, GcHandle, GcHandleKind, RuntimeError};
use hive_bridge::logger::{self, BoundarySink, LogCallback};
use hive_bridge::{
    ArrayInfo, AssemblyId, Bridge, BridgeError, BridgeOptions, BridgeResult, ClassId, ContextId,
    FieldId, MethodId, SharedBridge, UnloadState, INVALID_ID,
};
use once_cell::sync::Lazy;
use std::any::Any;
use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

/// Environment variable naming a TOML options file
pub const CONFIG_ENV: &str = "HIVE_BRIDGE_CONFIG";

/// `hive_unload_context` results
pub const HIVE_UNLOAD_FAILED: i32 = 0;
pub const HIVE_UNLOAD_COMPLETE: i32 = 1;
pub const HIVE_UNLOAD_INCOMPLETE: i32 = 2;

static BRIDGE: Lazy<SharedBridge> = Lazy::new(|| SharedBridge::new(Bridge::new(load_options())));

fn load_options() -> BridgeOptions {
    let Some(path) = std::env::var_os(CONFIG_ENV) else {
        return BridgeOptions::default();
    };
    BridgeOptions::from_file(Path::new(&path)).unwrap_or_else(|e| {
        tracing::warn!("Ignoring {}: {}", CONFIG_ENV, e);
        BridgeOptions::default()
    })
}

/// The bridge behind the C ABI, for Rust code linked into the same host
pub fn bridge() -> &'static SharedBridge {
    Lazy::force(&BRIDGE)
}

/// Make an image loadable by manifests that name it
///
/// Script crates linked into the host register their images here before the
/// host starts loading assemblies.
pub fn register_image<F>(name: &str, factory: F) -> bool
where
    F: Fn(&mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
{
    bridge()
        .with(|b| {
            b.register_image(name, factory);
            Ok(())
        })
        .is_ok()
}

// ============================================================================
// Helper Functions
// ============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run `f`, turning errors and panics into `sentinel`
///
/// Bridge operations log their own failures, so only panics are logged here.
fn contained<R>(action: &str, sentinel: R, f: impl FnOnce() -> BridgeResult<R>) -> R {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(_)) => sentinel,
        Err(payload) => {
            tracing::error!("{}. Message: {}", action, panic_message(payload.as_ref()));
            sentinel
        }
    }
}

/// [`contained`] with exclusive access to the shared bridge
fn guarded<R>(action: &str, sentinel: R, f: impl FnOnce(&mut Bridge) -> BridgeResult<R>) -> R {
    contained(action, sentinel, || bridge().with(f))
}

fn rejected(e: BridgeError) -> BridgeError {
    tracing::error!("Invalid argument. Message: {}", e);
    e
}

/// Borrow a NUL-terminated host string
unsafe fn host_str<'a>(ptr: *const c_char, what: &'static str) -> BridgeResult<&'a str> {
    if ptr.is_null() {
        return Err(rejected(BridgeError::NullArgument(what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| rejected(BridgeError::InvalidUtf8(what)))
}

fn handle_kind(raw: i32) -> BridgeResult<GcHandleKind> {
    GcHandleKind::from_raw(raw).ok_or_else(|| rejected(BridgeError::InvalidHandleKind(raw)))
}

fn handle_arg(ptr: *const c_void) -> BridgeResult<GcHandle> {
    GcHandle::from_ptr(ptr).ok_or_else(|| rejected(BridgeError::NullArgument("handle")))
}

fn chain(ctx: u64, asm: u64, cls: u64) -> (ContextId, AssemblyId, ClassId) {
    (ContextId::from(ctx), AssemblyId::from(asm), ClassId::from(cls))
}

// ============================================================================
// Logging
// ============================================================================

/// Install the host's log callbacks
///
/// Any callback may be NULL to drop that severity. Until this is called every
/// log line is dropped. Returns false when the process already had another
/// global `tracing` subscriber, in which case callbacks only receive what that
/// subscriber forwards.
///
/// # Safety
/// Each callback must stay callable for the rest of the process and accept a
/// NUL-terminated string that is only valid during the call.
#[no_mangle]
pub unsafe extern "C" fn hive_setup_logger(
    info: Option<LogCallback>,
    warn: Option<LogCallback>,
    trace: Option<LogCallback>,
    error: Option<LogCallback>,
) -> bool {
    contained("Unable to set up logger", false, || {
        let filter = bridge().with(|b| Ok(b.options().log_filter.clone()))?;
        Ok(logger::install(BoundarySink { info, warn, trace, error }, &filter))
    })
}

// ============================================================================
// Contexts and assemblies
// ============================================================================

/// Create a load context
///
/// # Returns
/// * The new context ID
/// * 0 when `name` is NULL or not UTF-8
///
/// # Safety
/// `name` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hive_create_assembly_context(name: *const c_char, can_unload: bool) -> u64 {
    guarded("Unable to create assembly context", INVALID_ID, |b| {
        let name = host_str(name, "name")?;
        Ok(b.create_assembly_context(name, can_unload).as_u64())
    })
}

/// Unload a collectible context
///
/// # Returns
/// * `HIVE_UNLOAD_COMPLETE` when nothing built in the context is alive
/// * `HIVE_UNLOAD_INCOMPLETE` when objects still reference its types; the IDs
///   are invalid either way
/// * `HIVE_UNLOAD_FAILED` for unknown or non-unloadable contexts
#[no_mangle]
pub extern "C" fn hive_unload_context(ctx: u64) -> i32 {
    guarded("Unable to unload context", HIVE_UNLOAD_FAILED, |b| {
        Ok(match b.unload_context(ContextId::from(ctx))? {
            UnloadState::Complete { .. } => HIVE_UNLOAD_COMPLETE,
            _ => HIVE_UNLOAD_INCOMPLETE,
        })
    })
}

/// Retry incomplete unloads; returns how many are still incomplete
#[no_mangle]
pub extern "C" fn hive_retry_pending_unloads() -> u32 {
    guarded("Unable to retry unloads", 0, |b| {
        b.retry_pending_unloads();
        Ok(b.pending_unloads() as u32)
    })
}

/// Load the assembly described by a manifest file
///
/// # Safety
/// `path` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hive_load_assembly_from_path(ctx: u64, path: *const c_char) -> u64 {
    guarded("Unable to load assembly from path", INVALID_ID, |b| {
        let path = host_str(path, "path")?;
        Ok(b.load_assembly_from_path(ContextId::from(ctx), Path::new(path))?.as_u64())
    })
}

// ============================================================================
// Reflection
// ============================================================================

/// Class IDs of an assembly; free `ptr` with `hive_memory_free`
#[no_mangle]
pub extern "C" fn hive_get_classes_from_assembly(ctx: u64, asm: u64) -> ArrayInfo {
    guarded("Unable to load classes from assembly", ArrayInfo::EMPTY, |b| {
        let ids = b.types_of_assembly(ContextId::from(ctx), AssemblyId::from(asm))?;
        b.export_ids(&ids)
    })
}

/// Public instance and static method IDs of a class
#[no_mangle]
pub extern "C" fn hive_get_methods_from_class(ctx: u64, asm: u64, cls: u64) -> ArrayInfo {
    guarded("Unable to load methods from class", ArrayInfo::EMPTY, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let ids = b.methods_of_type(ctx, asm, cls)?;
        b.export_ids(&ids)
    })
}

/// Field IDs of a class admitted by `binding_flags`
#[no_mangle]
pub extern "C" fn hive_class_get_fields(ctx: u64, asm: u64, cls: u64, binding_flags: u32) -> ArrayInfo {
    guarded("Unable to load fields from class", ArrayInfo::EMPTY, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let ids = b.fields_of_type(ctx, asm, cls, BindingFlags::from_bits_truncate(binding_flags))?;
        b.export_ids(&ids)
    })
}

#[no_mangle]
pub extern "C" fn hive_get_class_name(ctx: u64, asm: u64, cls: u64) -> *mut c_char {
    guarded("Unable to get class name", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.class_name(ctx, asm, cls)?;
        b.export_string(&name)
    })
}

/// Namespace of a class; an empty string when it has none
#[no_mangle]
pub extern "C" fn hive_get_class_namespace(ctx: u64, asm: u64, cls: u64) -> *mut c_char {
    guarded("Unable to get class namespace", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let namespace = b.class_namespace(ctx, asm, cls)?;
        b.export_string(&namespace)
    })
}

#[no_mangle]
pub extern "C" fn hive_get_class_full_name(ctx: u64, asm: u64, cls: u64) -> *mut c_char {
    guarded("Unable to get class full name", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.class_full_name(ctx, asm, cls)?;
        b.export_string(&name)
    })
}

#[no_mangle]
pub extern "C" fn hive_class_is_value_type(ctx: u64, asm: u64, cls: u64) -> bool {
    guarded("Unable to check value type", false, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.class_is_value_type(ctx, asm, cls)
    })
}

#[no_mangle]
pub extern "C" fn hive_class_is_enum(ctx: u64, asm: u64, cls: u64) -> bool {
    guarded("Unable to check enum type", false, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.class_is_enum(ctx, asm, cls)
    })
}

/// Whether the first class derives from the second; the chains may belong to
/// different contexts
#[no_mangle]
pub extern "C" fn hive_class_is_derived_from(
    ctx: u64,
    asm: u64,
    cls: u64,
    base_ctx: u64,
    base_asm: u64,
    base_cls: u64,
) -> bool {
    guarded("Unable to check class derivation", false, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let (base_ctx, base_asm, base_cls) = chain(base_ctx, base_asm, base_cls);
        b.class_is_subclass_of(ctx, asm, cls, base_ctx, base_asm, base_cls)
    })
}

/// Method ID by name; 0 when no single method matches
///
/// # Safety
/// `name` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hive_method_get_by_name(
    ctx: u64,
    asm: u64,
    cls: u64,
    name: *const c_char,
    binding_flags: u32,
) -> u64 {
    guarded("Unable to get method by name", INVALID_ID, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = host_str(name, "name")?;
        let flags = BindingFlags::from_bits_truncate(binding_flags);
        Ok(b.find_method_by_name(ctx, asm, cls, name, flags)?.as_u64())
    })
}

#[no_mangle]
pub extern "C" fn hive_get_method_name(ctx: u64, asm: u64, cls: u64, method: u64) -> *mut c_char {
    guarded("Unable to get method name", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.method_name(ctx, asm, cls, MethodId::from(method))?;
        b.export_string(&name)
    })
}

/// Number of parameters, or -1
#[no_mangle]
pub extern "C" fn hive_method_get_param_count(ctx: u64, asm: u64, cls: u64, method: u64) -> i32 {
    guarded("Unable to get method parameter count", -1, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        Ok(b.method_param_count(ctx, asm, cls, MethodId::from(method))? as i32)
    })
}

#[no_mangle]
pub extern "C" fn hive_method_get_return_type_name(
    ctx: u64,
    asm: u64,
    cls: u64,
    method: u64,
) -> *mut c_char {
    guarded("Unable to get method return type", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.method_return_type_name(ctx, asm, cls, MethodId::from(method))?;
        b.export_string(&name)
    })
}

#[no_mangle]
pub extern "C" fn hive_field_get_name(ctx: u64, asm: u64, cls: u64, field: u64) -> *mut c_char {
    guarded("Unable to get field name", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.field_name(ctx, asm, cls, FieldId::from(field))?;
        b.export_string(&name)
    })
}

#[no_mangle]
pub extern "C" fn hive_field_get_type_name(ctx: u64, asm: u64, cls: u64, field: u64) -> *mut c_char {
    guarded("Unable to get field type name", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let name = b.field_type_name(ctx, asm, cls, FieldId::from(field))?;
        b.export_string(&name)
    })
}

/// Packed field attributes: bit 0 static, bits 1..3 visibility, bit 4
/// init-only, bit 5 literal. Visibility is never zero, so 0 means failure.
#[no_mangle]
pub extern "C" fn hive_field_get_flags(ctx: u64, asm: u64, cls: u64, field: u64) -> u32 {
    guarded("Unable to get field flags", 0, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.field_flags(ctx, asm, cls, FieldId::from(field))
    })
}

// ============================================================================
// Objects and GC handles
// ============================================================================

/// Default-construct an instance behind a new GC handle
///
/// `kind` is 0 weak, 1 weak with resurrection tracking, 2 strong, 3 pinned.
#[no_mangle]
pub extern "C" fn hive_object_new_gc_handle(ctx: u64, asm: u64, cls: u64, kind: i32) -> *mut c_void {
    guarded("Unable to create object", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        let kind = handle_kind(kind)?;
        Ok(b.construct_instance(ctx, asm, cls, kind)?.as_ptr())
    })
}

/// Release a GC handle
#[no_mangle]
pub extern "C" fn hive_object_free_gc_handle(handle: *mut c_void) -> bool {
    guarded("Unable to free GC handle", false, |b| {
        b.free_gc_handle(handle_arg(handle)?)?;
        Ok(true)
    })
}

/// Stable address of a pinned object's data
#[no_mangle]
pub extern "C" fn hive_gc_handle_addr_of_pinned_object(handle: *mut c_void) -> *const c_void {
    guarded("Unable to get address of pinned object", ptr::null(), |b| {
        Ok(b.pinned_address(handle_arg(handle)?)?.cast())
    })
}

/// Allocate a managed string behind a new GC handle
///
/// # Safety
/// `text` must be NULL or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn hive_string_new_gc_handle(text: *const c_char, kind: i32) -> *mut c_void {
    guarded("Unable to create string", ptr::null_mut(), |b| {
        let text = host_str(text, "text")?;
        let kind = handle_kind(kind)?;
        Ok(b.new_string(text, kind).as_ptr())
    })
}

/// Copy the managed string behind a handle into a host-owned buffer
///
/// Returns NULL for a null target as well as on failure.
#[no_mangle]
pub extern "C" fn hive_string_from_gc_handle(handle: *mut c_void) -> *mut c_char {
    guarded("Unable to read string", ptr::null_mut(), |b| {
        match b.string_value(handle_arg(handle)?)? {
            Some(text) => b.export_string(&text),
            None => Ok(ptr::null_mut()),
        }
    })
}

/// Run one full collection; returns the number of objects freed
#[no_mangle]
pub extern "C" fn hive_collect_garbage() -> u64 {
    guarded("Unable to collect garbage", 0, |b| Ok(b.collect_garbage() as u64))
}

// ============================================================================
// Invocation and field data
// ============================================================================

/// Invoke a method
///
/// `instance` is a GC handle, or NULL for static methods. `args` holds one
/// pointer per parameter: value types point at their native layout, and for
/// reference types the pointer is a GC handle address (NULL for null).
///
/// # Returns
/// * A host-owned buffer for value results (free with `hive_free_int_ptr`)
/// * A new strong GC handle for reference results
/// * NULL for void or null results and on failure, including exceptions
///   thrown by the method
///
/// # Safety
/// `args` must hold one valid pointer per parameter.
#[no_mangle]
pub unsafe extern "C" fn hive_method_invoke(
    ctx: u64,
    asm: u64,
    cls: u64,
    method: u64,
    instance: *mut c_void,
    args: *const *const c_void,
) -> *mut c_void {
    guarded("Unable to invoke method", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.invoke_raw(ctx, asm, cls, MethodId::from(method), instance, args)
    })
}

/// Read a field into a new host-owned buffer or strong GC handle
///
/// # Safety
/// `instance` must be NULL or a GC handle.
#[no_mangle]
pub unsafe extern "C" fn hive_field_get_data(
    ctx: u64,
    asm: u64,
    cls: u64,
    field: u64,
    instance: *mut c_void,
) -> *mut c_void {
    guarded("Unable to get field data", ptr::null_mut(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.field_get_data(ctx, asm, cls, FieldId::from(field), instance)
    })
}

/// Write a field from native data
///
/// # Safety
/// `data` must point at the field type's native layout. For reference fields
/// it is a GC handle address (NULL for null).
#[no_mangle]
pub unsafe extern "C" fn hive_field_set_data(
    ctx: u64,
    asm: u64,
    cls: u64,
    field: u64,
    instance: *mut c_void,
    data: *const c_void,
) -> bool {
    guarded("Unable to set field data", false, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.field_set_data(ctx, asm, cls, FieldId::from(field), instance, data)?;
        Ok(true)
    })
}

/// Copy a field into host storage without allocating
///
/// # Safety
/// `out` must be writable for the field's native size, or one pointer for
/// reference fields.
#[no_mangle]
pub unsafe extern "C" fn hive_field_get_value(
    ctx: u64,
    asm: u64,
    cls: u64,
    field: u64,
    instance: *mut c_void,
    out: *mut c_void,
) -> bool {
    guarded("Unable to get field value", false, |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.field_copy_value(ctx, asm, cls, FieldId::from(field), instance, out)?;
        Ok(true)
    })
}

/// Native entry point of a native-callable method
#[no_mangle]
pub extern "C" fn hive_method_unmanaged_callers_only_get_function_pointer(
    ctx: u64,
    asm: u64,
    cls: u64,
    method: u64,
) -> *const c_void {
    guarded("Unable to get unmanaged function pointer", ptr::null(), |b| {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        b.unmanaged_function_pointer(ctx, asm, cls, MethodId::from(method))
    })
}

/// Cached delegate for any method
///
/// The result points at a `DelegateThunk` whose first field is the invoke
/// function: `thunk->invoke(thunk, instance, args)`. It stays valid until the
/// method's context is unloaded.
#[no_mangle]
pub extern "C" fn hive_method_instance_get_function_pointer(
    ctx: u64,
    asm: u64,
    cls: u64,
    method: u64,
) -> *const c_void {
    contained("Unable to get instance function pointer", ptr::null(), || {
        let (ctx, asm, cls) = chain(ctx, asm, cls);
        bridge()
            .instance_function_pointer(ctx, asm, cls, MethodId::from(method))
            .map(|thunk| thunk.cast())
    })
}

// ============================================================================
// Host-owned memory
// ============================================================================

/// Free a value buffer returned by invocation or field reads
#[no_mangle]
pub extern "C" fn hive_free_int_ptr(ptr: *mut c_void) {
    guarded("Unable to free pointer", (), |b| {
        b.free_memory(ptr);
        Ok(())
    })
}

/// Free an ID array or string returned by the bridge
#[no_mangle]
pub extern "C" fn hive_memory_free(ptr: *mut c_void) {
    guarded("Unable to free memory", (), |b| {
        b.free_memory(ptr);
        Ok(())
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Bridge version string; static, never freed
#[no_mangle]
pub extern "C" fn hive_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

// ============================================================================
// Tests
// ============================================================================
