//! Assembly loading
//!
//! An assembly on disk is a small TOML manifest naming a registered image:
//!
//! ```toml
//! [assembly]
//! name = "Game.Scripts"
//! version = "1.0.0"
//! image = "game-scripts"
//! ```
//!
//! The image factory defines the assembly's types inside the caller's load
//! scope. Loading is synchronous and completes before returning.

use crate::assembly::{Assembly, AssemblyBuilder, ScopeToken};
use crate::types::TypeDef;
use crate::RuntimeError;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Defines the types of one image
pub type ImageFactory =
    Arc<dyn Fn(&mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> + Send + Sync>;

/// Errors raised while loading an assembly
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unable to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown image '{0}'")]
    UnknownImage(String),

    #[error("Assembly {assembly} failed to build: {source}")]
    Build {
        assembly: String,
        #[source]
        source: RuntimeError,
    },
}

/// On-disk assembly manifest
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyManifest {
    pub assembly: ManifestEntry,
}

/// The `[assembly]` table of a manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub image: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl AssemblyManifest {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read and parse a manifest file
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| LoadError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where a loading assembly builds its types and what it can see
pub struct LoadScope {
    token: Arc<ScopeToken>,
    visible: Vec<Arc<Assembly>>,
}

impl LoadScope {
    /// `visible` are the assemblies types may be imported from
    pub fn new(token: Arc<ScopeToken>, visible: Vec<Arc<Assembly>>) -> Self {
        Self { token, visible }
    }

    pub fn token(&self) -> &Arc<ScopeToken> {
        &self.token
    }

    pub fn find_type(&self, full_name: &str) -> Option<Arc<TypeDef>> {
        self.visible
            .iter()
            .find_map(|asm| asm.find_type(full_name).cloned())
    }
}

/// Registered images by name
#[derive(Clone, Default)]
pub struct ImageRegistry {
    images: FxHashMap<String, ImageFactory>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an image
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&mut AssemblyBuilder<'_>) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.images.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    /// Build an assembly from a registered image
    pub fn load_image(
        &self,
        image: &str,
        assembly_name: &str,
        version: &str,
        scope: &LoadScope,
        location: Option<PathBuf>,
    ) -> Result<Assembly, LoadError> {
        let factory = self
            .images
            .get(image)
            .ok_or_else(|| LoadError::UnknownImage(image.to_string()))?;

        let mut builder = AssemblyBuilder::new(assembly_name, version, scope);
        factory(&mut builder).map_err(|source| LoadError::Build {
            assembly: assembly_name.to_string(),
            source,
        })?;

        tracing::debug!(
            assembly = assembly_name,
            image,
            scope = scope.token().name(),
            "assembly built"
        );
        Ok(builder.finish(location))
    }

    /// Read a manifest and build the image it names
    pub fn load_from_path(&self, path: &Path, scope: &LoadScope) -> Result<Assembly, LoadError> {
        let manifest = AssemblyManifest::read(path)?;
        let entry = &manifest.assembly;
        self.load_image(
            &entry.image,
            &entry.name,
            &entry.version,
            scope,
            Some(path.to_path_buf()),
        )
    }
}

impl std::fmt::Debug for ImageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.images.keys().collect();
        names.sort();
        f.debug_struct("ImageRegistry").field("images", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeBuilder;

    #[test]
    fn test_manifest_default_version() {
        let manifest = AssemblyManifest::parse(
            r#"
            [assembly]
            name = "Game"
            image = "game"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.assembly.version, "1.0.0");
        assert_eq!(manifest.assembly.image, "game");
    }

    #[test]
    fn test_unknown_image() {
        let registry = ImageRegistry::new();
        let scope = LoadScope::new(ScopeToken::new("x", true), Vec::new());
        let err = registry
            .load_image("missing", "Game", "1.0.0", &scope, None)
            .unwrap_err();
        assert!(matches!(err, LoadError::UnknownImage(ref name) if name == "missing"));
    }

    #[test]
    fn test_import_from_visible_assembly() {
        let mut registry = ImageRegistry::new();
        registry.register("core", |asm| {
            asm.define(TypeBuilder::class("Hive", "Behaviour"))?;
            Ok(())
        });
        registry.register("scripts", |asm| {
            let base = asm
                .import("Hive.Behaviour")
                .ok_or_else(|| RuntimeError::MissingType("Hive.Behaviour".into()))?;
            asm.define(TypeBuilder::class("Game", "Player").base(&base))?;
            Ok(())
        });

        let core_scope = LoadScope::new(ScopeToken::new("core", false), Vec::new());
        let core = Arc::new(
            registry
                .load_image("core", "Hive.Core", "1.0.0", &core_scope, None)
                .unwrap(),
        );
        let script_scope = LoadScope::new(ScopeToken::new("scripts", true), vec![core.clone()]);
        let scripts = registry
            .load_image("scripts", "Game", "1.0.0", &script_scope, None)
            .unwrap();

        let player = scripts.find_type("Game.Player").unwrap();
        assert!(player.is_subclass_of(&core.types()[0]));
        assert!(player.scope().is_collectible());
    }

    #[test]
    fn test_build_failure_is_reported() {
        let mut registry = ImageRegistry::new();
        registry.register("dup", |asm| {
            asm.define(TypeBuilder::class("", "A"))?;
            asm.define(TypeBuilder::class("", "A"))?;
            Ok(())
        });
        let scope = LoadScope::new(ScopeToken::new("x", true), Vec::new());
        let err = registry.load_image("dup", "Dup", "1", &scope, None).unwrap_err();
        assert!(matches!(err, LoadError::Build { .. }));
    }
}
