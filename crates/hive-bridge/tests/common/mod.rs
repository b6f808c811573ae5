//! Shared fixtures: an engine core image, a game script image and manifests
//! for both in a temporary directory.

#![allow(dead_code)]

use hive_bridge::hive_runtime::{
    AssemblyBuilder, CallFrame, ManagedException, MethodBuilder, PrimitiveType, RuntimeError,
    TypeBuilder, TypeRef, Value,
};
use hive_bridge::{AssemblyId, Bridge, BridgeOptions, ClassId, ContextId};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Fixture {
    pub bridge: Bridge,
    pub core_manifest: PathBuf,
    pub scripts_manifest: PathBuf,
    _dir: TempDir,
}

pub extern "C" fn native_add(a: i32, b: i32) -> i32 {
    a + b
}

fn int_arg(frame: &CallFrame<'_>, index: usize) -> Result<i32, ManagedException> {
    frame
        .arg(index)?
        .as_i32()
        .ok_or_else(|| ManagedException::argument(format!("argument {} is not an Int32", index)))
}

pub fn define_engine_core(builder: &mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> {
    builder.define(
        TypeBuilder::class("Engine", "Component")
            .field("Enabled", PrimitiveType::Boolean)
            .method(
                MethodBuilder::instance("Describe")
                    .returns(TypeRef::String)
                    .virtual_dispatch()
                    .body(|f| Ok(f.new_string("component"))),
            ),
    )?;
    Ok(())
}

pub fn define_game_scripts(builder: &mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> {
    let component = builder
        .import("Engine.Component")
        .ok_or_else(|| RuntimeError::MissingType("Engine.Component".to_string()))?;

    let vector3 = builder.define(
        TypeBuilder::structure("Game", "Vector3")
            .field("X", PrimitiveType::Single)
            .field("Y", PrimitiveType::Single)
            .field("Z", PrimitiveType::Single),
    )?;

    builder.define(
        TypeBuilder::enumeration("Game", "Color", PrimitiveType::Int32)
            .variant("Red", 0)
            .variant("Green", 1),
    )?;

    builder.define(
        TypeBuilder::class("Game", "MathUtil")
            .static_field("Count", PrimitiveType::Int32)
            .static_field("Cache", TypeRef::Object)
            .method(
                MethodBuilder::static_method("Identity")
                    .param("v", &vector3)
                    .returns(&vector3)
                    .body(|f| Ok(f.arg(0)?.clone())),
            )
            .method(
                MethodBuilder::static_method("Add")
                    .param("a", PrimitiveType::Int32)
                    .param("b", PrimitiveType::Int32)
                    .returns(PrimitiveType::Int32)
                    .body(|f| Ok(Value::I32(int_arg(f, 0)? + int_arg(f, 1)?))),
            )
            .method(
                MethodBuilder::static_method("Greet")
                    .param("name", TypeRef::String)
                    .returns(TypeRef::String)
                    .body(|f| {
                        let name = f.string(f.arg(0)?)?;
                        Ok(f.new_string(format!("Hello, {}", name)))
                    }),
            )
            .method(
                MethodBuilder::static_method("Fail")
                    .body(|_| Err(ManagedException::argument("bad input"))),
            )
            .method(MethodBuilder::static_method("Explode").body(|_| panic!("script panicked")))
            .method(
                MethodBuilder::static_method("NativeAdd")
                    .param("a", PrimitiveType::Int32)
                    .param("b", PrimitiveType::Int32)
                    .returns(PrimitiveType::Int32)
                    .native_entry(native_add as *const c_void)
                    .body(|f| Ok(Value::I32(int_arg(f, 0)? + int_arg(f, 1)?))),
            ),
    )?;

    builder.define(
        TypeBuilder::class("Game", "Player")
            .base(&component)
            .field("Health", PrimitiveType::Int32)
            .field("Name", TypeRef::String)
            .field("Position", &vector3)
            .private_field("secret", PrimitiveType::Int32)
            .constructor(|f| {
                let this = f.this()?;
                f.set_field(this, "Health", Value::I32(100))?;
                Ok(Value::Void)
            })
            .method(
                MethodBuilder::instance("Describe")
                    .returns(TypeRef::String)
                    .virtual_dispatch()
                    .body(|f| Ok(f.new_string("player"))),
            )
            .method(
                MethodBuilder::instance("Damage")
                    .param("amount", PrimitiveType::Int32)
                    .returns(PrimitiveType::Int32)
                    .body(|f| {
                        let this = f.this()?;
                        let health = f.get_field(this, "Health")?.as_i32().unwrap_or(0);
                        let left = health - int_arg(f, 0)?;
                        f.set_field(this, "Health", Value::I32(left))?;
                        Ok(Value::I32(left))
                    }),
            ),
    )?;

    builder.define(TypeBuilder::class("Game", "Singleton").without_default_constructor())?;
    Ok(())
}

pub fn write_manifest(dir: &Path, file: &str, name: &str, image: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(
        &path,
        format!("[assembly]\nname = \"{}\"\nversion = \"1.0.0\"\nimage = \"{}\"\n", name, image),
    )
    .unwrap();
    path
}

pub fn fixture() -> Fixture {
    fixture_with(BridgeOptions::default())
}

pub fn fixture_with(options: BridgeOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let core_manifest = write_manifest(dir.path(), "engine.toml", "Engine.Core", "engine-core");
    let scripts_manifest = write_manifest(dir.path(), "scripts.toml", "Game.Scripts", "game-scripts");

    let mut bridge = Bridge::new(options);
    bridge.register_image("engine-core", define_engine_core);
    bridge.register_image("game-scripts", define_game_scripts);

    Fixture {
        bridge,
        core_manifest,
        scripts_manifest,
        _dir: dir,
    }
}

/// A permanent engine context plus an unloadable script context
pub struct Loaded {
    pub core: ContextId,
    pub core_asm: AssemblyId,
    pub scripts: ContextId,
    pub scripts_asm: AssemblyId,
}

impl Fixture {
    pub fn load(&mut self) -> Loaded {
        let core = self.bridge.create_assembly_context("engine", false);
        let core_asm = self
            .bridge
            .load_assembly_from_path(core, &self.core_manifest)
            .unwrap();
        let scripts = self.bridge.create_assembly_context("scripts", true);
        let scripts_asm = self
            .bridge
            .load_assembly_from_path(scripts, &self.scripts_manifest)
            .unwrap();
        Loaded {
            core,
            core_asm,
            scripts,
            scripts_asm,
        }
    }

    /// Class ID of `full_name` in an assembly
    pub fn class(&mut self, ctx: ContextId, asm: AssemblyId, full_name: &str) -> ClassId {
        let classes = self.bridge.types_of_assembly(ctx, asm).unwrap();
        classes
            .into_iter()
            .find(|&cls| self.bridge.class_full_name(ctx, asm, cls).unwrap() == full_name)
            .unwrap()
    }
}
