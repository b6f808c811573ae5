//! GC handles
//!
//! A GC handle lets code outside the managed heap name an object. Strong and
//! pinned handles keep their target alive; weak handles observe it and are
//! cleared once it is collected. Handle values look like aligned addresses
//! and are never reused.

use super::heap::{Heap, ObjectRef};
use rustc_hash::FxHashMap;
use std::ffi::c_void;
use std::num::NonZeroUsize;

/// First handle value handed out
const HANDLE_BASE: usize = 0x1000;

/// Distance between consecutive handle values
const HANDLE_STRIDE: usize = 0x10;

/// Lifetime category of a handle; discriminants are shared with native hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GcHandleKind {
    /// Cleared as soon as the target becomes unreachable
    Weak = 0,
    /// Cleared only once the target has been finalized and freed
    WeakTrackResurrection = 1,
    /// Keeps the target alive
    Normal = 2,
    /// Keeps the target alive at a fixed address
    Pinned = 3,
}

impl GcHandleKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(GcHandleKind::Weak),
            1 => Some(GcHandleKind::WeakTrackResurrection),
            2 => Some(GcHandleKind::Normal),
            3 => Some(GcHandleKind::Pinned),
            _ => None,
        }
    }

    /// Whether the handle roots its target
    pub fn is_strong(self) -> bool {
        matches!(self, GcHandleKind::Normal | GcHandleKind::Pinned)
    }
}

/// Opaque handle value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHandle(NonZeroUsize);

impl GcHandle {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(GcHandle)
    }

    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        Self::from_raw(ptr as usize)
    }

    pub fn as_raw(self) -> usize {
        self.0.get()
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

/// Handle lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("GC handle {0:#x} is invalid")]
    Invalid(usize),

    #[error("GC handle {0:#x} is not pinned")]
    NotPinned(usize),

    #[error("GC handle {0:#x} target has been collected")]
    Collected(usize),
}

#[derive(Debug)]
struct HandleEntry {
    kind: GcHandleKind,
    target: Option<ObjectRef>,
}

/// Table of live GC handles
#[derive(Debug)]
pub struct GcHandleTable {
    entries: FxHashMap<GcHandle, HandleEntry>,
    next: usize,
}

impl Default for GcHandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GcHandleTable {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            next: HANDLE_BASE,
        }
    }

    /// Create a handle; `None` makes an empty handle
    pub fn alloc(&mut self, target: Option<ObjectRef>, kind: GcHandleKind) -> GcHandle {
        let handle = GcHandle(NonZeroUsize::new(self.next).unwrap_or(NonZeroUsize::MIN));
        self.next += HANDLE_STRIDE;
        self.entries.insert(handle, HandleEntry { kind, target });
        handle
    }

    /// Release a handle
    pub fn free(&mut self, handle: GcHandle) -> Result<(), HandleError> {
        self.entries
            .remove(&handle)
            .map(|_| ())
            .ok_or(HandleError::Invalid(handle.as_raw()))
    }

    /// Current target; `None` once a weak handle's target was collected
    pub fn target(&self, handle: GcHandle) -> Result<Option<ObjectRef>, HandleError> {
        self.entries
            .get(&handle)
            .map(|e| e.target)
            .ok_or(HandleError::Invalid(handle.as_raw()))
    }

    pub fn kind(&self, handle: GcHandle) -> Result<GcHandleKind, HandleError> {
        self.entries
            .get(&handle)
            .map(|e| e.kind)
            .ok_or(HandleError::Invalid(handle.as_raw()))
    }

    /// Address of a pinned instance's native data block
    pub fn pinned_address(&self, heap: &Heap, handle: GcHandle) -> Result<*const u8, HandleError> {
        let entry = self
            .entries
            .get(&handle)
            .ok_or(HandleError::Invalid(handle.as_raw()))?;
        if entry.kind != GcHandleKind::Pinned {
            return Err(HandleError::NotPinned(handle.as_raw()));
        }
        entry
            .target
            .and_then(|r| heap.get(r))
            .map(|object| match object.as_instance() {
                Some(instance) => instance.data_ptr(),
                None => object.as_str().map_or(std::ptr::null(), |s| s.as_ptr()),
            })
            .ok_or(HandleError::Collected(handle.as_raw()))
    }

    /// Targets of strong and pinned handles
    pub fn roots(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.entries
            .values()
            .filter(|e| e.kind.is_strong())
            .filter_map(|e| e.target)
    }

    /// Clear handles of the given kind whose target fails `alive`
    pub(crate) fn clear_weak(&mut self, kind: GcHandleKind, alive: impl Fn(ObjectRef) -> bool) {
        for entry in self.entries.values_mut().filter(|e| e.kind == kind) {
            if entry.target.is_some_and(|r| !alive(r)) {
                entry.target = None;
            }
        }
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
