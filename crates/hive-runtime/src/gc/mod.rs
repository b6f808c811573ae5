//! Garbage collection
//!
//! - **Heap**: generation-checked slot arena of objects
//! - **GcHandleTable**: weak, strong and pinned handles visible to native code
//! - **GarbageCollector**: mark-sweep collection with a finalization queue

mod collector;
mod handles;
mod heap;

pub use collector::{GarbageCollector, GcStats, HeapStats, DEFAULT_GC_THRESHOLD};
pub use handles::{GcHandle, GcHandleKind, GcHandleTable, HandleError};
pub use heap::{Heap, ObjectRef};
