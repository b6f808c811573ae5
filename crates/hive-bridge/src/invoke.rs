//! Invocation engine
//!
//! Construction, method calls and field access. The typed surface takes and
//! returns [`Value`]s; the raw surface applies the native marshaling rules:
//! value types as bytes in their layout, references as GC handle addresses.
//! Value results are copied into caller-owned buffers and reference results
//! get a new strong handle the caller must free.
//!
//! References in typed results are not rooted. They stay valid until the next
//! collection unless the caller wraps them with [`Bridge::new_gc_handle`] or
//! passes them straight back as arguments, which roots them for that call.
//! A collected reference fails the call with `StaleReference`.

use crate::bridge::Bridge;
use crate::error::{log_failure, BridgeError, BridgeResult};
use crate::ids::{AssemblyId, ClassId, ContextId, FieldId, MethodId};
use crate::marshal;
use hive_runtime::gc::HandleError;
use hive_runtime::{
    construct_object, run_guarded, CallFrame, FieldDef, GcHandle, GcHandleKind, MethodDef,
    ObjectRef, RuntimeError, TypeRef, Value,
};
use std::ffi::c_void;
use std::sync::Arc;

impl Bridge {
    /// Default-construct an instance and wrap it in a handle of `kind`
    pub fn construct_instance(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        kind: GcHandleKind,
    ) -> BridgeResult<GcHandle> {
        self.maybe_collect(&[]);
        self.try_construct(ctx, asm, cls, kind)
            .inspect_err(|e| log_failure("Unable to create object", e))
    }

    fn try_construct(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        kind: GcHandleKind,
    ) -> BridgeResult<GcHandle> {
        let ty = self.catalog.class(ctx, asm, cls)?.ty.clone();
        let object = construct_object(self.gc.heap_mut(), &ty)?;
        Ok(self.gc.handles_mut().alloc(Some(object), kind))
    }

    /// Call a method with managed values
    ///
    /// `instance` is ignored for static methods. Exceptions thrown by the
    /// method come back as [`BridgeError::UserException`]. Object arguments
    /// are rooted across the collection the call may trigger; an object in
    /// the result is not.
    #[allow(clippy::too_many_arguments)]
    pub fn invoke(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
        instance: Option<GcHandle>,
        args: &[Value],
    ) -> BridgeResult<Value> {
        let pinned: Vec<ObjectRef> = args.iter().filter_map(Value::as_object).collect();
        self.maybe_collect(&pinned);
        self.try_invoke(ctx, asm, cls, method, instance, args)
            .inspect_err(|e| log_failure("Unable to invoke method", e))
    }

    #[allow(clippy::too_many_arguments)]
    fn try_invoke(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
        instance: Option<GcHandle>,
        args: &[Value],
    ) -> BridgeResult<Value> {
        let method = self.resolve_method(ctx, asm, cls, method)?;
        let this = self.instance_target(instance)?;
        self.call(&method, this, args)
    }

    /// Call a method with native arguments
    ///
    /// `instance` is a handle address or null for static calls. `args` holds
    /// one pointer per formal parameter. Returns a caller-owned buffer for
    /// value results, a new strong handle for reference results and null for
    /// void or null results.
    ///
    /// # Safety
    /// `args` must hold one valid pointer per parameter; value-type arguments
    /// must point at the parameter type's native layout.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn invoke_raw(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
        instance: *const c_void,
        args: *const *const c_void,
    ) -> BridgeResult<*mut c_void> {
        self.maybe_collect(&[]);
        self.try_invoke_raw(ctx, asm, cls, method, instance, args)
            .inspect_err(|e| log_failure("Unable to invoke method", e))
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn try_invoke_raw(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
        instance: *const c_void,
        args: *const *const c_void,
    ) -> BridgeResult<*mut c_void> {
        let method = self.resolve_method(ctx, asm, cls, method)?;
        let this = self.instance_target(GcHandle::from_ptr(instance))?;
        let values = marshal::read_native_args(self.gc.handles(), method.params(), args)?;
        let result = self.call(&method, this, &values)?;
        self.export_value(method.return_type(), result)
    }

    /// Read a field; `instance` is ignored for static fields
    pub fn field_get_value(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: Option<GcHandle>,
    ) -> BridgeResult<Value> {
        self.load(ctx, asm, cls, field, instance)
            .map(|(_, value)| value)
            .inspect_err(|e| log_failure("Unable to get field value", e))
    }

    /// Write a field; `instance` is ignored for static fields
    pub fn field_set_value(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: Option<GcHandle>,
        value: &Value,
    ) -> BridgeResult<()> {
        self.store(ctx, asm, cls, field, instance, value)
            .inspect_err(|e| log_failure("Unable to set field value", e))
    }

    /// Read a field into a new caller-owned buffer or strong handle
    ///
    /// # Safety
    /// `instance` must be null or a handle address.
    pub unsafe fn field_get_data(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: *const c_void,
    ) -> BridgeResult<*mut c_void> {
        self.load(ctx, asm, cls, field, GcHandle::from_ptr(instance))
            .and_then(|(field, value)| self.export_value(field.field_type(), value))
            .inspect_err(|e| log_failure("Unable to get field data", e))
    }

    /// Write a field from native data
    ///
    /// # Safety
    /// For value-type fields `data` must point at the field type's native
    /// layout; for reference fields it is a handle address or null.
    pub unsafe fn field_set_data(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: *const c_void,
        data: *const c_void,
    ) -> BridgeResult<()> {
        let result = self.resolve_field(ctx, asm, cls, field).and_then(|def| {
            let value = marshal::read_native(self.gc.handles(), def.field_type(), data)?;
            self.store_resolved(&def, GcHandle::from_ptr(instance), &value)
        });
        result.inspect_err(|e| log_failure("Unable to set field data", e))
    }

    /// Copy a field into caller storage
    ///
    /// Value-type fields are written in their native layout. Reference fields
    /// write the address of a new strong handle, or zero for null.
    ///
    /// # Safety
    /// `out` must be writable for the field type's native size, or for one
    /// pointer when the field is a reference.
    pub unsafe fn field_copy_value(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: *const c_void,
        out: *mut c_void,
    ) -> BridgeResult<()> {
        let result = if out.is_null() {
            Err(BridgeError::NullArgument("out"))
        } else {
            self.load(ctx, asm, cls, field, GcHandle::from_ptr(instance))
                .and_then(|(def, value)| {
                    let ty = def.field_type();
                    if ty.is_value_type() {
                        let bytes = marshal::native_bytes(&value, ty)?;
                        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, bytes.len());
                    } else {
                        let handle = self.export_reference(&value)?;
                        (out as *mut usize).write_unaligned(handle as usize);
                    }
                    Ok(())
                })
        };
        result.inspect_err(|e| log_failure("Unable to copy field value", e))
    }

    /// Native entry point of a native-callable method
    pub fn unmanaged_function_pointer(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<*const c_void> {
        self.resolve_method(ctx, asm, cls, method)
            .and_then(|m| {
                m.native_entry()
                    .map(|entry| entry.as_ptr())
                    .ok_or_else(|| BridgeError::NotNativeCallable(qualified_name(&m)))
            })
            .inspect_err(|e| log_failure("Unable to get unmanaged function pointer", e))
    }

    fn resolve_method(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<Arc<MethodDef>> {
        Ok(self.catalog.method(ctx, asm, cls, method)?.method.clone())
    }

    fn resolve_field(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
    ) -> BridgeResult<Arc<FieldDef>> {
        Ok(self.catalog.field(ctx, asm, cls, field)?.field.clone())
    }

    /// Object behind an optional instance handle
    fn instance_target(&self, instance: Option<GcHandle>) -> BridgeResult<Option<ObjectRef>> {
        let Some(handle) = instance else {
            return Ok(None);
        };
        self.gc
            .handles()
            .target(handle)?
            .map(Some)
            .ok_or(BridgeError::Handle(HandleError::Collected(handle.as_raw())))
    }

    fn load(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: Option<GcHandle>,
    ) -> BridgeResult<(Arc<FieldDef>, Value)> {
        let def = self.resolve_field(ctx, asm, cls, field)?;
        let target = if def.is_static() {
            None
        } else {
            self.instance_target(instance)?
        };
        let value = self.gc.heap().load_field(target, &def)?;
        Ok((def, value))
    }

    fn store(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        instance: Option<GcHandle>,
        value: &Value,
    ) -> BridgeResult<()> {
        let def = self.resolve_field(ctx, asm, cls, field)?;
        self.store_resolved(&def, instance, value)
    }

    fn store_resolved(
        &mut self,
        def: &FieldDef,
        instance: Option<GcHandle>,
        value: &Value,
    ) -> BridgeResult<()> {
        let target = if def.is_static() {
            None
        } else {
            self.instance_target(instance)?
        };
        Ok(self.gc.heap_mut().store_field(target, def, value)?)
    }

    /// Run a resolved method under the exception guard
    fn call(
        &mut self,
        method: &Arc<MethodDef>,
        instance: Option<ObjectRef>,
        args: &[Value],
    ) -> BridgeResult<Value> {
        if args.len() != method.params().len() {
            return Err(BridgeError::ArgumentCount {
                method: qualified_name(method),
                expected: method.params().len(),
                actual: args.len(),
            });
        }
        for (arg, param) in args.iter().zip(method.params()) {
            self.gc.heap().check_value(arg, &param.ty)?;
        }

        let (target, method) = if method.is_static() {
            (None, method.clone())
        } else {
            let this = instance.ok_or_else(|| BridgeError::InstanceRequired(qualified_name(method)))?;
            let receiver = self.gc.heap().instance(this)?.type_def().clone();
            let declaring = method
                .declaring_type()
                .ok_or(BridgeError::Runtime(RuntimeError::TypeUnloaded))?;
            if !receiver.is_assignable_to(&declaring) {
                return Err(BridgeError::Runtime(RuntimeError::TypeMismatch {
                    expected: declaring.full_name(),
                    found: receiver.full_name(),
                }));
            }
            (Some(this), receiver.resolve_override(method))
        };

        let body = method
            .body()
            .cloned()
            .ok_or_else(|| BridgeError::MissingBody(qualified_name(&method)))?;
        if self.options.trace_invocations {
            tracing::trace!(method = %qualified_name(&method), args = args.len(), "invoke");
        }

        let mut frame = CallFrame::new(self.gc.heap_mut(), target, args);
        Ok(run_guarded(&body, &mut frame)?)
    }

    /// Hand a result to the host under the ownership rules
    fn export_value(&mut self, ty: &TypeRef, value: Value) -> BridgeResult<*mut c_void> {
        match value {
            Value::Void => Ok(std::ptr::null_mut()),
            Value::Null | Value::Object(_) => self.export_reference(&value),
            other => {
                let bytes = marshal::native_bytes(&other, ty)?;
                self.memory.alloc_bytes(&bytes)
            }
        }
    }

    /// New strong handle for a reference, null for a null reference
    fn export_reference(&mut self, value: &Value) -> BridgeResult<*mut c_void> {
        match value {
            Value::Null => Ok(std::ptr::null_mut()),
            Value::Object(r) => Ok(self.gc.handles_mut().alloc(Some(*r), GcHandleKind::Normal).as_ptr()),
            other => Err(BridgeError::Runtime(RuntimeError::TypeMismatch {
                expected: "reference".to_string(),
                found: other.kind_name().to_string(),
            })),
        }
    }
}

fn qualified_name(method: &MethodDef) -> String {
    match method.declaring_type() {
        Some(ty) => format!("{}.{}", ty.full_name(), method.name()),
        None => method.name().to_string(),
    }
}
