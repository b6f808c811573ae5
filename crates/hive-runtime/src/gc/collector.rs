//! Mark-sweep garbage collector
//!
//! Roots are strong and pinned GC handles, objects waiting for their
//! finalizer, and whatever the caller supplies (static fields of loaded
//! types). Collections only run when asked; the bridge asks between calls,
//! never while a method body holds values on the Rust stack.

use super::handles::{GcHandleKind, GcHandleTable};
use super::heap::{Heap, ObjectRef};
use crate::frame::{run_guarded, CallFrame};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Collection threshold used until the first collection adjusts it
pub const DEFAULT_GC_THRESHOLD: usize = 1024 * 1024;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total finalizers run
    pub finalizers_run: usize,

    /// Total pause time
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,
}

/// Heap statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub allocated_bytes: usize,
    pub live_objects: usize,
    pub handles: usize,
    pub pending_finalizers: usize,
    pub threshold: usize,
}

/// Mark-sweep garbage collector owning the heap and its handle table
#[derive(Debug)]
pub struct GarbageCollector {
    heap: Heap,
    handles: GcHandleTable,
    finalization_queue: VecDeque<ObjectRef>,
    base_threshold: usize,
    threshold: usize,
    stats: GcStats,
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_GC_THRESHOLD)
    }
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector that asks for a collection once `bytes` are allocated
    pub fn with_threshold(bytes: usize) -> Self {
        Self {
            heap: Heap::new(),
            handles: GcHandleTable::new(),
            finalization_queue: VecDeque::new(),
            base_threshold: bytes,
            threshold: bytes,
            stats: GcStats::default(),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn handles(&self) -> &GcHandleTable {
        &self.handles
    }

    pub fn handles_mut(&mut self) -> &mut GcHandleTable {
        &mut self.handles
    }

    /// Heap and handle table borrowed together
    pub fn split_mut(&mut self) -> (&mut Heap, &mut GcHandleTable) {
        (&mut self.heap, &mut self.handles)
    }

    /// Whether allocation has passed the threshold
    pub fn should_collect(&self) -> bool {
        self.heap.allocated_bytes() > self.threshold
    }

    /// Run a full collection; returns the number of objects freed
    pub fn collect(&mut self, extra_roots: impl IntoIterator<Item = ObjectRef>) -> usize {
        let start = Instant::now();

        // Mark phase
        self.heap.clear_marks();
        let mut roots: Vec<ObjectRef> = self.handles.roots().collect();
        roots.extend(extra_roots);
        roots.extend(self.finalization_queue.iter().copied());
        self.mark_from(roots);

        let heap = &self.heap;
        self.handles.clear_weak(GcHandleKind::Weak, |r| heap.is_marked(r));

        // Unreachable objects that still owe a finalizer survive this cycle
        let resurrected: Vec<ObjectRef> = self
            .heap
            .iter_refs()
            .filter(|r| !self.heap.is_marked(*r))
            .filter(|r| self.heap.get(*r).is_some_and(|o| o.pending_finalizer().is_some()))
            .collect();
        self.finalization_queue.extend(resurrected.iter().copied());
        self.mark_from(resurrected);

        // Sweep phase
        let garbage: Vec<ObjectRef> = self
            .heap
            .iter_refs()
            .filter(|r| !self.heap.is_marked(*r))
            .collect();
        let freed = garbage
            .into_iter()
            .filter(|r| self.heap.free(*r).is_some())
            .count();

        let heap = &self.heap;
        self.handles
            .clear_weak(GcHandleKind::WeakTrackResurrection, |r| heap.contains(r));

        // Update stats
        let duration = start.elapsed();
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.last_pause_time = duration;
        self.stats.total_pause_time += duration;

        // Adjust threshold (grow by 2x current usage)
        self.threshold = (self.heap.allocated_bytes() * 2).max(self.base_threshold);

        tracing::debug!(
            freed,
            live = self.heap.live_objects(),
            queued_finalizers = self.finalization_queue.len(),
            "collection finished"
        );
        freed
    }

    fn mark_from(&mut self, roots: Vec<ObjectRef>) {
        let mut worklist = roots;
        while let Some(r) = worklist.pop() {
            if !self.heap.mark(r) {
                continue;
            }
            if let Some(object) = self.heap.get(r) {
                worklist.extend(object.references());
            }
        }
    }

    /// Run queued finalizers; failures are logged and swallowed
    pub fn run_finalizers(&mut self) -> usize {
        let mut ran = 0;
        while let Some(r) = self.finalization_queue.pop_front() {
            let Some(body) = self.heap.get(r).and_then(|o| o.pending_finalizer()) else {
                continue;
            };
            if let Some(object) = self.heap.get_mut(r) {
                object.mark_finalized();
            }

            let mut frame = CallFrame::new(&mut self.heap, Some(r), &[]);
            if let Err(e) = run_guarded(&body, &mut frame) {
                tracing::warn!(object = r.index(), "finalizer failed: {}", e);
            }
            ran += 1;
        }
        self.stats.finalizers_run += ran;
        ran
    }

    /// Objects waiting for their finalizer
    pub fn pending_finalizers(&self) -> usize {
        self.finalization_queue.len()
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn heap_stats(&self) -> HeapStats {
        HeapStats {
            allocated_bytes: self.heap.allocated_bytes(),
            live_objects: self.heap.live_objects(),
            handles: self.handles.len(),
            pending_finalizers: self.finalization_queue.len(),
            threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ScopeToken;
    use crate::types::{TypeBuilder, TypeRef};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn node_type() -> Arc<crate::types::TypeDef> {
        let scope = ScopeToken::new("test", false);
        TypeBuilder::class("", "Node")
            .field("Next", TypeRef::Object)
            .build(&scope)
            .unwrap()
    }

    #[test]
    fn test_unrooted_objects_are_freed() {
        let mut gc = GarbageCollector::new();
        gc.heap_mut().alloc_string("garbage");
        let kept = gc.heap_mut().alloc_string("kept");
        gc.handles_mut().alloc(Some(kept), GcHandleKind::Normal);

        assert_eq!(gc.collect([]), 1);
        assert!(gc.heap().contains(kept));
        assert_eq!(gc.stats().collections, 1);
    }

    #[test]
    fn test_references_are_traced() {
        let ty = node_type();
        let next = ty.declared_fields()[0].clone();
        let mut gc = GarbageCollector::new();
        let a = gc.heap_mut().alloc_instance(&ty);
        let b = gc.heap_mut().alloc_instance(&ty);
        gc.heap_mut().store_field(Some(a), &next, &Value::Object(b)).unwrap();
        // cycle back to a
        gc.heap_mut().store_field(Some(b), &next, &Value::Object(a)).unwrap();

        assert_eq!(gc.collect([a]), 0);
        assert_eq!(gc.collect([]), 2);
    }

    #[test]
    fn test_weak_handles_cleared() {
        let mut gc = GarbageCollector::new();
        let obj = gc.heap_mut().alloc_string("weak");
        let weak = gc.handles_mut().alloc(Some(obj), GcHandleKind::Weak);

        gc.collect([]);
        assert_eq!(gc.handles().target(weak), Ok(None));
        assert_eq!(gc.handles().len(), 1);
    }

    #[test]
    fn test_finalizer_delays_free_by_one_cycle() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);
        let scope = ScopeToken::new("test", false);
        let ty = TypeBuilder::class("", "Resource")
            .finalizer(|_| {
                RUNS.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Void)
            })
            .build(&scope)
            .unwrap();

        let mut gc = GarbageCollector::new();
        let obj = gc.heap_mut().alloc_instance(&ty);
        let short = gc.handles_mut().alloc(Some(obj), GcHandleKind::Weak);
        let long = gc.handles_mut().alloc(Some(obj), GcHandleKind::WeakTrackResurrection);

        assert_eq!(gc.collect([]), 0);
        assert_eq!(gc.pending_finalizers(), 1);
        assert_eq!(gc.handles().target(short), Ok(None));
        assert_eq!(gc.handles().target(long), Ok(Some(obj)));

        assert_eq!(gc.run_finalizers(), 1);
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);

        assert_eq!(gc.collect([]), 1);
        assert_eq!(gc.handles().target(long), Ok(None));
        assert_eq!(gc.stats().finalizers_run, 1);
    }

    #[test]
    fn test_failing_finalizer_is_contained() {
        let scope = ScopeToken::new("test", false);
        let ty = TypeBuilder::class("", "Faulty")
            .finalizer(|_| panic!("finalizer exploded"))
            .build(&scope)
            .unwrap();
        let mut gc = GarbageCollector::new();
        gc.heap_mut().alloc_instance(&ty);
        gc.collect([]);
        assert_eq!(gc.run_finalizers(), 1);
        assert_eq!(gc.collect([]), 1);
    }

    #[test]
    fn test_threshold() {
        let mut gc = GarbageCollector::with_threshold(32);
        assert!(!gc.should_collect());
        gc.heap_mut().alloc_string("a string long enough to cross the threshold");
        assert!(gc.should_collect());
        gc.collect([]);
        assert!(!gc.should_collect());
    }
}
