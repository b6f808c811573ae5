//! Reflective delegates for native callers
//!
//! A method without a native entry point can still be called through a
//! function pointer. The bridge hands out the address of a `DelegateThunk`
//! whose first field is the invoke function; the thunk carries the full ID
//! chain and calls back into the shared bridge.

use crate::bridge::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::ids::{AssemblyId, ClassId, ContextId, MethodId};
use crate::shared::SharedBridge;
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Signature of [`DelegateThunk::invoke`]
pub type DelegateInvokeFn = unsafe extern "C" fn(
    thunk: *const DelegateThunk,
    instance: *mut c_void,
    args: *const *const c_void,
) -> *mut c_void;

/// Cached delegate; layout is shared with native hosts
#[repr(C)]
#[derive(Debug)]
pub struct DelegateThunk {
    pub invoke: DelegateInvokeFn,
    pub context: u64,
    pub assembly: u64,
    pub class: u64,
    pub method: u64,
    owner: *const SharedBridge,
}

// SAFETY: `owner` points at a `'static` SharedBridge, which is Sync.
unsafe impl Send for DelegateThunk {}

impl DelegateThunk {
    fn new(owner: &'static SharedBridge, ctx: ContextId, asm: AssemblyId, cls: ClassId, method: MethodId) -> Self {
        Self {
            invoke: invoke_thunk,
            context: ctx.as_u64(),
            assembly: asm.as_u64(),
            class: cls.as_u64(),
            method: method.as_u64(),
            owner,
        }
    }
}

/// Invoke entry point stored in every thunk
///
/// Returns what `MethodInvoke` would; failures are logged and yield null.
unsafe extern "C" fn invoke_thunk(
    thunk: *const DelegateThunk,
    instance: *mut c_void,
    args: *const *const c_void,
) -> *mut c_void {
    let result = catch_unwind(AssertUnwindSafe(|| -> BridgeResult<*mut c_void> {
        let thunk = thunk.as_ref().ok_or(BridgeError::NullArgument("thunk"))?;
        let owner = &*thunk.owner;
        owner.with(|bridge| {
            bridge.invoke_raw(
                ContextId::from(thunk.context),
                AssemblyId::from(thunk.assembly),
                ClassId::from(thunk.class),
                MethodId::from(thunk.method),
                instance,
                args,
            )
        })
    }));
    match result {
        Ok(Ok(ptr)) => ptr,
        Ok(Err(_)) => std::ptr::null_mut(),
        Err(_) => {
            tracing::error!("Delegate invocation panicked");
            std::ptr::null_mut()
        }
    }
}

impl Bridge {
    /// The memoized thunk for a method, built on first request
    pub(crate) fn delegate_for(
        &mut self,
        owner: &'static SharedBridge,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<*const DelegateThunk> {
        let record = self.catalog.method_mut(ctx, asm, cls, method)?;
        let thunk = record
            .delegate
            .get_or_insert_with(|| Box::new(DelegateThunk::new(owner, ctx, asm, cls, method)));
        Ok(&**thunk as *const DelegateThunk)
    }
}
