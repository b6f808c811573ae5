//! Bulk results
//!
//! Enumerations return a `(pointer, length)` pair. The buffer is allocated
//! with the process allocator and belongs to the caller, who must release it
//! through the bridge's free entry point.

use std::ffi::c_void;

/// Pointer and element count of a caller-owned buffer of 64-bit IDs
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    pub ptr: *mut c_void,
    pub length: u64,
}

impl ArrayInfo {
    /// Returned for empty results and failures
    pub const EMPTY: ArrayInfo = ArrayInfo {
        ptr: std::ptr::null_mut(),
        length: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// View the IDs
    ///
    /// # Safety
    /// `ptr` must still point at `length` initialized `u64`s.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u64] {
        if self.ptr.is_null() || self.length == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.ptr as *const u64, self.length as usize)
    }
}

impl Default for ArrayInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}
