//! The bridge service object
//!
//! One `Bridge` owns every table the boundary exposes: the ID counter, the
//! context/assembly/type/member catalog, the managed heap with its GC
//! handles, the registry of host-owned buffers and the trackers of unloads
//! still in progress. Finished unloads leave only their final state behind. Nothing here is global; the FFI crate keeps one
//! instance per process.

use crate::bulk::ArrayInfo;
use crate::catalog::{AssemblyRecord, ReflectionCatalog};
use crate::config::BridgeOptions;
use crate::context::{ContextRecord, ContextState, UnloadState, UnloadTracker};
use crate::error::{log_failure, BridgeError, BridgeResult};
use crate::ids::{AssemblyId, ContextId, HandleAllocator, RawId};
use crate::memory::UnmanagedMemory;
use crate::table::IdTable;
use hive_runtime::gc::{GcStats, HeapStats};
use rustc_hash::FxHashMap;
use hive_runtime::{
    AssemblyBuilder, GarbageCollector, GcHandle, GcHandleKind, ImageRegistry, LoadError, LoadScope,
    ObjectRef, RuntimeError,
};
use std::ffi::{c_char, c_void};
use std::path::Path;
use std::sync::Arc;

/// Bridge between a native host and the managed runtime
#[derive(Debug)]
pub struct Bridge {
    pub(crate) options: BridgeOptions,
    pub(crate) ids: HandleAllocator,
    pub(crate) catalog: ReflectionCatalog,
    pub(crate) images: ImageRegistry,
    pub(crate) gc: GarbageCollector,
    pub(crate) memory: UnmanagedMemory,
    unloads: IdTable<ContextId, UnloadTracker>,
    finished: FxHashMap<ContextId, ContextState>,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self::with_images(options, ImageRegistry::new())
    }

    pub fn with_images(options: BridgeOptions, images: ImageRegistry) -> Self {
        let gc = GarbageCollector::with_threshold(options.gc_threshold_bytes);
        Self {
            options,
            ids: HandleAllocator::new(),
            catalog: ReflectionCatalog::default(),
            images,
            gc,
            memory: UnmanagedMemory::new(),
            unloads: IdTable::new(),
            finished: FxHashMap::default(),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Register the factory behind an image name
    pub fn register_image<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.images.register(name, factory);
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Create an open context; only `can_unload` contexts may be unloaded
    pub fn create_assembly_context(&mut self, name: &str, can_unload: bool) -> ContextId {
        let id = ContextId::from(self.ids.next_id());
        self.catalog.insert(id, ContextRecord::new(name, can_unload));
        tracing::debug!(context = id.as_u64(), name, can_unload, "context created");
        id
    }

    /// Lifecycle state of a context, `None` for IDs never issued as contexts
    pub fn context_state(&self, ctx: ContextId) -> Option<ContextState> {
        if self.catalog.context(ctx).is_ok() {
            return Some(ContextState::Open);
        }
        self.unloads
            .get(ctx)
            .map(|tracker| tracker.state().context_state())
            .or_else(|| self.finished.get(&ctx).copied())
    }

    /// IDs of the open contexts, oldest first
    pub fn contexts(&self) -> Vec<ContextId> {
        self.catalog.context_ids()
    }

    /// Unload a collectible context
    ///
    /// The context leaves the lookup tables immediately, so every ID issued
    /// under it stops resolving. The bridge then collects until nothing built
    /// in the context is alive or the retry budget runs out. An incomplete
    /// unload is logged and kept for [`Bridge::retry_pending_unloads`].
    pub fn unload_context(&mut self, ctx: ContextId) -> BridgeResult<UnloadState> {
        let record = self
            .catalog
            .context(ctx)
            .and_then(|record| {
                if record.can_unload {
                    Ok(record)
                } else {
                    Err(BridgeError::NotUnloadable(ctx))
                }
            })
            .inspect_err(|e| log_failure("Unable to unload context", e))?;

        let observer = Arc::downgrade(&record.token);
        let name = record.name.clone();
        for assembly in record.assemblies() {
            assembly.clear_statics();
        }
        drop(self.catalog.remove(ctx));

        let mut tracker =
            UnloadTracker::new(ctx, &name, observer, self.options.unload_retry_budget);
        let state = tracker.run(&mut || {
            self.full_collect(&[]);
        });
        self.settle_unload(tracker);
        Ok(state)
    }

    /// Give every incomplete unload another round of collections
    pub fn retry_pending_unloads(&mut self) -> Vec<(ContextId, UnloadState)> {
        let pending: Vec<ContextId> = self.unloads.keys().collect();

        let mut results = Vec::with_capacity(pending.len());
        for ctx in pending {
            let Some(mut tracker) = self.unloads.remove(ctx) else {
                continue;
            };
            tracker.retry(self.options.unload_retry_budget);
            let state = tracker.run(&mut || {
                self.full_collect(&[]);
            });
            self.settle_unload(tracker);
            results.push((ctx, state));
        }
        results
    }

    /// Unloads whose context is still reachable
    pub fn pending_unloads(&self) -> usize {
        self.unloads.len()
    }

    /// Keep an incomplete tracker for retries; a finished one leaves its state
    fn settle_unload(&mut self, tracker: UnloadTracker) {
        self.report_unload(&tracker);
        let ctx = tracker.context();
        if matches!(tracker.state(), UnloadState::Incomplete { .. }) {
            self.unloads.insert(ctx, tracker);
        } else {
            self.finished.insert(ctx, tracker.state().context_state());
        }
    }

    fn report_unload(&self, tracker: &UnloadTracker) {
        match tracker.state() {
            UnloadState::Incomplete { attempts } => tracing::warn!(
                context = tracker.context().as_u64(),
                attempts,
                "Unload of context {} is incomplete; its types are still referenced",
                tracker.name()
            ),
            UnloadState::Complete { attempts } => tracing::debug!(
                context = tracker.context().as_u64(),
                attempts,
                "context {} unloaded",
                tracker.name()
            ),
            _ => {}
        }
    }

    /// Load the assembly described by a manifest into a context
    pub fn load_assembly_from_path(&mut self, ctx: ContextId, path: &Path) -> BridgeResult<AssemblyId> {
        self.load_with(ctx, |images, scope| images.load_from_path(path, scope))
            .inspect_err(|e| log_failure("Unable to load assembly from path", e))
    }

    /// Load a registered image directly, without a manifest
    pub fn load_assembly_image(
        &mut self,
        ctx: ContextId,
        image: &str,
        name: &str,
        version: &str,
    ) -> BridgeResult<AssemblyId> {
        self.load_with(ctx, |images, scope| {
            images.load_image(image, name, version, scope, None)
        })
        .inspect_err(|e| log_failure("Unable to load assembly image", e))
    }

    fn load_with(
        &mut self,
        ctx: ContextId,
        load: impl FnOnce(&ImageRegistry, &LoadScope) -> Result<hive_runtime::Assembly, LoadError>,
    ) -> BridgeResult<AssemblyId> {
        let record = self.catalog.context(ctx)?;
        let mut visible: Vec<_> = record.assemblies().cloned().collect();
        visible.extend(self.catalog.shared_assemblies());
        let scope = LoadScope::new(record.token.clone(), visible);

        let assembly = load(&self.images, &scope)?;
        if record.find_assembly(assembly.name()).is_some() {
            return Err(BridgeError::DuplicateAssembly {
                name: assembly.name().to_string(),
                context: ctx,
            });
        }

        let id = AssemblyId::from(self.ids.next_id());
        tracing::debug!(
            context = ctx.as_u64(),
            assembly = id.as_u64(),
            name = assembly.name(),
            types = assembly.types().len(),
            "assembly loaded"
        );
        self.catalog
            .context_mut(ctx)?
            .assemblies
            .insert(id, AssemblyRecord::new(Arc::new(assembly)));
        Ok(id)
    }

    /// IDs of the assemblies loaded into a context, in load order
    pub fn assemblies_of_context(&self, ctx: ContextId) -> BridgeResult<Vec<AssemblyId>> {
        self.catalog
            .context(ctx)
            .map(|record| record.assemblies.keys().collect())
            .inspect_err(|e| log_failure("Unable to list assemblies", e))
    }

    // ========================================================================
    // GC handles and collection
    // ========================================================================

    /// Wrap an object in a new handle
    pub fn new_gc_handle(&mut self, target: Option<ObjectRef>, kind: GcHandleKind) -> GcHandle {
        self.gc.handles_mut().alloc(target, kind)
    }

    /// Release a handle; the value is never handed out again
    pub fn free_gc_handle(&mut self, handle: GcHandle) -> BridgeResult<()> {
        self.gc
            .handles_mut()
            .free(handle)
            .map_err(BridgeError::from)
            .inspect_err(|e| log_failure("Unable to free GC handle", e))
    }

    /// Current target of a handle; `None` once a weak target was collected
    pub fn handle_target(&self, handle: GcHandle) -> BridgeResult<Option<ObjectRef>> {
        self.gc
            .handles()
            .target(handle)
            .map_err(BridgeError::from)
            .inspect_err(|e| log_failure("Unable to resolve GC handle", e))
    }

    /// Stable address of a pinned object's data
    pub fn pinned_address(&self, handle: GcHandle) -> BridgeResult<*const u8> {
        self.gc
            .handles()
            .pinned_address(self.gc.heap(), handle)
            .map_err(BridgeError::from)
            .inspect_err(|e| log_failure("Unable to get address of pinned object", e))
    }

    /// Allocate a managed string behind a new handle
    pub fn new_string(&mut self, text: &str, kind: GcHandleKind) -> GcHandle {
        let object = self.gc.heap_mut().alloc_string(text);
        self.gc.handles_mut().alloc(Some(object), kind)
    }

    /// Text of the string a handle refers to
    pub fn string_value(&self, handle: GcHandle) -> BridgeResult<Option<String>> {
        let result = self.gc.handles().target(handle).map_err(BridgeError::from).and_then(|target| {
            match target {
                None => Ok(None),
                Some(r) => self
                    .gc
                    .heap()
                    .string(r)
                    .map(|s| Some(s.to_string()))
                    .ok_or_else(|| {
                        BridgeError::Runtime(RuntimeError::TypeMismatch {
                            expected: "System.String".to_string(),
                            found: self.gc.heap().get(r).map_or("null".to_string(), |o| o.type_name()),
                        })
                    }),
            }
        });
        result.inspect_err(|e| log_failure("Unable to read string", e))
    }

    /// One full collection plus finalizer drain; returns objects freed
    pub fn collect_garbage(&mut self) -> usize {
        self.full_collect(&[])
    }

    /// Collect with statics, handles and `extra` as roots
    pub(crate) fn full_collect(&mut self, extra: &[ObjectRef]) -> usize {
        let mut roots = self.catalog.static_roots();
        roots.extend_from_slice(extra);
        let freed = self.gc.collect(roots);
        self.gc.run_finalizers();
        freed
    }

    /// Collect at a call boundary when allocation passed the threshold
    ///
    /// `extra` holds the references the pending call is about to use.
    pub(crate) fn maybe_collect(&mut self, extra: &[ObjectRef]) {
        if self.gc.should_collect() {
            self.full_collect(extra);
        }
    }

    pub fn gc_stats(&self) -> &GcStats {
        self.gc.stats()
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.gc.heap_stats()
    }

    pub fn gc(&self) -> &GarbageCollector {
        &self.gc
    }

    // ========================================================================
    // Host-owned memory
    // ========================================================================

    /// Copy IDs into a caller-owned array
    pub fn export_ids<I: RawId>(&mut self, ids: &[I]) -> BridgeResult<ArrayInfo> {
        let raw: Vec<u64> = ids.iter().map(RawId::as_u64).collect();
        self.memory
            .alloc_ids(&raw)
            .inspect_err(|e| log_failure("Unable to allocate result array", e))
    }

    /// Copy a string into a caller-owned NUL-terminated buffer
    pub fn export_string(&mut self, s: &str) -> BridgeResult<*mut c_char> {
        self.memory
            .alloc_string(s)
            .inspect_err(|e| log_failure("Unable to allocate string", e))
    }

    /// Release a buffer returned by the bridge
    pub fn free_memory(&mut self, ptr: *mut c_void) -> bool {
        self.memory.free(ptr)
    }

    pub fn memory(&self) -> &UnmanagedMemory {
        &self.memory
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}
