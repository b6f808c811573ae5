//! Collectible scopes end to end
//!
//! Tests cover:
//! - A scope token outlives its assembly while instances are reachable
//! - Finalizers delay reclamation by one cycle
//! - Weak and resurrection-tracking handles clear at different points
//! - Manifest loading and cross-scope imports

use hive_runtime::{
    construct_object, AssemblyBuilder, GarbageCollector, GcHandleKind, ImageRegistry, LoadError,
    LoadScope, PrimitiveType, RuntimeError, ScopeToken, TypeBuilder, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

fn define_plugin(builder: &mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> {
    builder.define(
        TypeBuilder::class("Plugin", "Resource")
            .field("Id", PrimitiveType::Int32)
            .finalizer(|_| {
                FINALIZED.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Void)
            }),
    )?;
    Ok(())
}

fn define_extension(builder: &mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> {
    let resource = builder
        .import("Plugin.Resource")
        .ok_or_else(|| RuntimeError::MissingType("Plugin.Resource".to_string()))?;
    builder.define(TypeBuilder::class("Plugin", "Texture").base(&resource))?;
    Ok(())
}

fn registry() -> ImageRegistry {
    let mut images = ImageRegistry::new();
    images.register("plugin", define_plugin);
    images.register("extension", define_extension);
    images
}

#[test]
fn test_scope_dies_after_last_instance() {
    let images = registry();
    let token = ScopeToken::new("plugin", true);
    let observer = Arc::downgrade(&token);
    let scope = LoadScope::new(token, Vec::new());
    let assembly = images
        .load_image("plugin", "Plugin", "1.0.0", &scope, None)
        .unwrap();
    drop(scope);

    let mut gc = GarbageCollector::new();
    let ty = assembly.find_type("Plugin.Resource").unwrap().clone();
    let object = construct_object(gc.heap_mut(), &ty).unwrap();
    let strong = gc.handles_mut().alloc(Some(object), GcHandleKind::Normal);
    let tracking = gc
        .handles_mut()
        .alloc(Some(object), GcHandleKind::WeakTrackResurrection);
    let weak = gc.handles_mut().alloc(Some(object), GcHandleKind::Weak);
    drop(ty);
    drop(assembly);

    // Only the instance keeps the scope alive now
    assert!(observer.upgrade().is_some());
    assert_eq!(gc.collect(std::iter::empty()), 0);

    gc.handles_mut().free(strong).unwrap();
    let before = FINALIZED.load(Ordering::SeqCst);

    // First cycle queues the finalizer instead of freeing
    assert_eq!(gc.collect(std::iter::empty()), 0);
    assert_eq!(gc.handles().target(weak).unwrap(), None);
    assert_eq!(gc.handles().target(tracking).unwrap(), Some(object));
    assert_eq!(gc.pending_finalizers(), 1);
    assert_eq!(gc.run_finalizers(), 1);
    assert_eq!(FINALIZED.load(Ordering::SeqCst), before + 1);

    assert_eq!(gc.collect(std::iter::empty()), 1);
    assert_eq!(gc.handles().target(tracking).unwrap(), None);
    assert!(observer.upgrade().is_none());
    assert_eq!(gc.stats().finalizers_run, 1);
}

#[test]
fn test_extra_roots_keep_objects() {
    let images = registry();
    let scope = LoadScope::new(ScopeToken::new("roots", true), Vec::new());
    let assembly = images
        .load_image("plugin", "Plugin", "1.0.0", &scope, None)
        .unwrap();
    let ty = assembly.find_type("Plugin.Resource").unwrap();

    let mut gc = GarbageCollector::new();
    let object = construct_object(gc.heap_mut(), ty).unwrap();
    assert_eq!(gc.collect([object]), 0);
    assert!(gc.heap().contains(object));
    assert_eq!(gc.heap_stats().live_objects, 1);
}

#[test]
fn test_manifest_and_imports() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("plugin.toml");
    std::fs::write(&manifest, "[assembly]\nname = \"Plugin\"\nimage = \"plugin\"\n").unwrap();

    let images = registry();
    let scope = LoadScope::new(ScopeToken::new("host", false), Vec::new());
    let plugin = images.load_from_path(&manifest, &scope).unwrap();
    assert_eq!(plugin.name(), "Plugin");
    assert_eq!(plugin.version(), "1.0.0");
    assert_eq!(plugin.location(), Some(manifest.as_path()));

    // Imports resolve only through the visible assemblies
    let isolated = LoadScope::new(ScopeToken::new("isolated", true), Vec::new());
    let err = images
        .load_image("extension", "Extension", "1.0.0", &isolated, None)
        .unwrap_err();
    assert!(matches!(err, LoadError::Build { .. }));

    let plugin = Arc::new(plugin);
    let linked = LoadScope::new(ScopeToken::new("linked", true), vec![plugin.clone()]);
    let extension = images
        .load_image("extension", "Extension", "1.0.0", &linked, None)
        .unwrap();
    let texture = extension.find_type("Plugin.Texture").unwrap();
    let resource = plugin.find_type("Plugin.Resource").unwrap();
    assert!(texture.is_subclass_of(resource));

    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        images.load_from_path(&missing, &scope),
        Err(LoadError::Io { .. })
    ));
    assert!(matches!(
        images.load_image("nope", "Nope", "1.0.0", &scope, None),
        Err(LoadError::UnknownImage(name)) if name == "nope"
    ));
}
