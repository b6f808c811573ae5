//! Native marshaling
//!
//! Value types cross the boundary as raw bytes in their native layout.
//! Reference types cross as GC handle addresses; a null address is a null
//! reference.

use crate::error::{BridgeError, BridgeResult};
use hive_runtime::gc::{GcHandle, GcHandleTable};
use hive_runtime::types::ParamDef;
use hive_runtime::{RuntimeError, TypeRef, Value};
use std::ffi::c_void;

/// Resolve a handle address to a reference value
pub(crate) fn resolve_handle(handles: &GcHandleTable, ptr: *const c_void) -> BridgeResult<Value> {
    match GcHandle::from_ptr(ptr) {
        None => Ok(Value::Null),
        Some(handle) => Ok(handles.target(handle)?.map_or(Value::Null, Value::Object)),
    }
}

/// Decode one native argument of type `ty`
///
/// # Safety
/// For value types `ptr` must point at `ty`'s native layout.
pub(crate) unsafe fn read_native(
    handles: &GcHandleTable,
    ty: &TypeRef,
    ptr: *const c_void,
) -> BridgeResult<Value> {
    if !ty.is_value_type() {
        return resolve_handle(handles, ptr);
    }
    if ptr.is_null() {
        return Err(BridgeError::NullArgument("value-type argument"));
    }
    let layout = ty
        .native_layout()
        .ok_or_else(|| BridgeError::NotMarshalable(ty.full_name()))?;
    let bytes = std::slice::from_raw_parts(ptr as *const u8, layout.size);
    Value::read_native(ty, bytes).ok_or_else(|| BridgeError::NotMarshalable(ty.full_name()))
}

/// Decode an argument pointer array against the formal parameters
///
/// # Safety
/// `args` must hold one pointer per parameter, each valid for
/// [`read_native`].
pub(crate) unsafe fn read_native_args(
    handles: &GcHandleTable,
    params: &[ParamDef],
    args: *const *const c_void,
) -> BridgeResult<Vec<Value>> {
    if params.is_empty() {
        return Ok(Vec::new());
    }
    if args.is_null() {
        return Err(BridgeError::NullArgument("args"));
    }
    params
        .iter()
        .enumerate()
        .map(|(i, param)| read_native(handles, &param.ty, *args.add(i)))
        .collect()
}

/// Encode a value type into its native bytes
pub(crate) fn native_bytes(value: &Value, ty: &TypeRef) -> BridgeResult<Vec<u8>> {
    let layout = ty
        .native_layout()
        .ok_or_else(|| BridgeError::NotMarshalable(ty.full_name()))?;
    let mut bytes = vec![0u8; layout.size];
    if value.write_native(ty, &mut bytes) {
        Ok(bytes)
    } else {
        Err(BridgeError::Runtime(RuntimeError::TypeMismatch {
            expected: ty.full_name(),
            found: value.kind_name().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_runtime::gc::{GcHandleKind, Heap};
    use hive_runtime::PrimitiveType;

    #[test]
    fn test_primitive_round_trip() {
        let handles = GcHandleTable::new();
        let ty = TypeRef::Primitive(PrimitiveType::Int32);
        let bytes = native_bytes(&Value::I32(-42), &ty).unwrap();
        let value = unsafe { read_native(&handles, &ty, bytes.as_ptr() as *const c_void) }.unwrap();
        assert_eq!(value, Value::I32(-42));
    }

    #[test]
    fn test_reference_arguments() {
        let mut heap = Heap::new();
        let obj = heap.alloc_string("hello");
        let mut handles = GcHandleTable::new();
        let handle = handles.alloc(Some(obj), GcHandleKind::Normal);

        let value = resolve_handle(&handles, handle.as_ptr()).unwrap();
        assert_eq!(value, Value::Object(obj));
        assert_eq!(resolve_handle(&handles, std::ptr::null()).unwrap(), Value::Null);

        handles.free(handle).unwrap();
        assert!(matches!(
            resolve_handle(&handles, handle.as_ptr()),
            Err(BridgeError::Handle(_))
        ));
    }

    #[test]
    fn test_args_require_array() {
        let handles = GcHandleTable::new();
        let params = vec![ParamDef {
            name: "x".to_string(),
            ty: TypeRef::Primitive(PrimitiveType::Double),
        }];
        let result = unsafe { read_native_args(&handles, &params, std::ptr::null()) };
        assert!(matches!(result, Err(BridgeError::NullArgument("args"))));

        let empty = unsafe { read_native_args(&handles, &[], std::ptr::null()) }.unwrap();
        assert!(empty.is_empty());

        let x = 2.5f64;
        let args = [&x as *const f64 as *const c_void];
        let values = unsafe { read_native_args(&handles, &params, args.as_ptr()) }.unwrap();
        assert_eq!(values, vec![Value::F64(2.5)]);
    }
}
