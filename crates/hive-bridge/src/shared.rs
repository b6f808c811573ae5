//! Thread-safe bridge access
//!
//! Native hosts reach the bridge from whatever thread they run on. Calls from
//! different threads are serialized by a lock. A call that arrives while the
//! same thread is already inside the bridge (user code calling back through a
//! function pointer) is rejected instead of deadlocking.

use crate::bridge::Bridge;
use crate::delegate::DelegateThunk;
use crate::error::{log_failure, BridgeError, BridgeResult};
use crate::ids::{AssemblyId, ClassId, ContextId, MethodId};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;

/// A bridge behind a re-entrancy-checked lock
pub struct SharedBridge {
    inner: ReentrantMutex<RefCell<Bridge>>,
}

impl SharedBridge {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(bridge)),
        }
    }

    /// Run `f` with exclusive access to the bridge
    pub fn with<R>(&self, f: impl FnOnce(&mut Bridge) -> BridgeResult<R>) -> BridgeResult<R> {
        let guard = self.inner.lock();
        let mut bridge = guard.try_borrow_mut().map_err(|_| {
            let e = BridgeError::Reentrant;
            log_failure("Rejected bridge call", &e);
            e
        })?;
        f(&mut bridge)
    }

    /// Address of a cached delegate that invokes the method reflectively
    ///
    /// The thunk lives as long as the method's catalog entry. Call it as
    /// `thunk->invoke(thunk, instance_handle, args)`.
    pub fn instance_function_pointer(
        &'static self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<*const DelegateThunk> {
        self.with(|bridge| {
            bridge
                .delegate_for(self, ctx, asm, cls, method)
                .inspect_err(|e| log_failure("Unable to get instance function pointer", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeOptions;

    #[test]
    fn test_nested_call_is_rejected() {
        let shared = SharedBridge::new(Bridge::new(BridgeOptions::default()));
        let outer = shared.with(|_| {
            let inner = shared.with(|bridge| Ok(bridge.create_assembly_context("nested", true)));
            assert!(matches!(inner, Err(BridgeError::Reentrant)));
            Ok(())
        });
        assert!(outer.is_ok());
    }

    #[test]
    fn test_calls_from_threads_are_serialized() {
        let shared: &'static SharedBridge =
            Box::leak(Box::new(SharedBridge::new(Bridge::new(BridgeOptions::default()))));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    shared
                        .with(|bridge| Ok(bridge.create_assembly_context(&format!("ctx{}", i), true)))
                        .unwrap()
                })
            })
            .collect();
        let mut ids: Vec<u64> = workers.into_iter().map(|w| w.join().unwrap().as_u64()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
