//! Unmanaged memory handed to the host
//!
//! Strings, ID arrays and marshaled return values are copied into buffers
//! from the process allocator. The host owns them and returns them through
//! [`UnmanagedMemory::free`]. The registry only exists so a bad or repeated
//! free is reported instead of corrupting the allocator.

use crate::bulk::ArrayInfo;
use crate::error::{BridgeError, BridgeResult};
use rustc_hash::FxHashMap;
use std::ffi::{c_char, c_void};

/// Registry of outstanding host-owned buffers
#[derive(Debug, Default)]
pub struct UnmanagedMemory {
    live: FxHashMap<usize, usize>,
    total_allocations: u64,
}

impl UnmanagedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy bytes into a new buffer
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> BridgeResult<*mut c_void> {
        let size = bytes.len().max(1);
        // SAFETY: size is non-zero; the result is checked for null.
        let ptr = unsafe { libc::malloc(size) };
        if ptr.is_null() {
            return Err(BridgeError::OutOfMemory(size));
        }
        // SAFETY: the buffer holds at least `bytes.len()` bytes and cannot overlap `bytes`.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len()) };
        self.live.insert(ptr as usize, size);
        self.total_allocations += 1;
        Ok(ptr)
    }

    /// Copy IDs into a new array; empty input yields [`ArrayInfo::EMPTY`]
    pub fn alloc_ids(&mut self, ids: &[u64]) -> BridgeResult<ArrayInfo> {
        if ids.is_empty() {
            return Ok(ArrayInfo::EMPTY);
        }
        let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_ne_bytes()).collect();
        let ptr = self.alloc_bytes(&bytes)?;
        Ok(ArrayInfo {
            ptr,
            length: ids.len() as u64,
        })
    }

    /// Copy a string into a NUL-terminated buffer
    ///
    /// Interior NULs truncate the host's view of the string.
    pub fn alloc_string(&mut self, s: &str) -> BridgeResult<*mut c_char> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        Ok(self.alloc_bytes(&bytes)? as *mut c_char)
    }

    /// Release a buffer handed out by this registry
    ///
    /// Null is a no-op. Unknown or already freed pointers are logged and
    /// ignored; returns whether anything was freed.
    pub fn free(&mut self, ptr: *mut c_void) -> bool {
        if ptr.is_null() {
            return false;
        }
        if self.live.remove(&(ptr as usize)).is_none() {
            tracing::warn!(address = ptr as usize, "ignoring free of unknown pointer");
            return false;
        }
        // SAFETY: the pointer came from `libc::malloc` in `alloc_bytes` and
        // was still registered, so it has not been freed.
        unsafe { libc::free(ptr) };
        true
    }

    /// Whether `ptr` is an outstanding buffer
    pub fn owns(&self, ptr: *const c_void) -> bool {
        self.live.contains_key(&(ptr as usize))
    }

    /// Buffers handed out and not yet freed
    pub fn outstanding(&self) -> usize {
        self.live.len()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.live.values().sum()
    }

    /// Buffers handed out since creation
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations
    }
}
