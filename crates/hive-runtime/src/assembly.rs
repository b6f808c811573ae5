//! Assemblies and load scopes
//!
//! Every type built for a load context holds a clone of that context's
//! `ScopeToken`. Observing the token weakly tells whether anything built in the
//! context is still alive.

use crate::gc::ObjectRef;
use crate::loader::LoadScope;
use crate::types::{TypeBuilder, TypeDef};
use crate::RuntimeError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Keep-alive token shared by every type built in one load context
#[derive(Debug)]
pub struct ScopeToken {
    name: String,
    collectible: bool,
}

impl ScopeToken {
    pub fn new(name: impl Into<String>, collectible: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            collectible,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_collectible(&self) -> bool {
        self.collectible
    }
}

/// A loaded set of types
#[derive(Debug)]
pub struct Assembly {
    name: String,
    version: String,
    location: Option<PathBuf>,
    types: Vec<Arc<TypeDef>>,
}

impl Assembly {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Manifest path the assembly was loaded from
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Types in definition order
    pub fn types(&self) -> &[Arc<TypeDef>] {
        &self.types
    }

    pub fn find_type(&self, full_name: &str) -> Option<&Arc<TypeDef>> {
        self.types.iter().find(|ty| ty.full_name() == full_name)
    }

    /// Heap references held by static fields of this assembly's types
    pub fn static_references(&self) -> Vec<ObjectRef> {
        self.types
            .iter()
            .flat_map(|ty| ty.statics().references().collect::<Vec<_>>())
            .collect()
    }

    /// Drop static references so the heap can reclaim what they pointed to
    pub fn clear_statics(&self) {
        for ty in &self.types {
            ty.statics().clear_references();
        }
    }
}

/// Collects the types of one assembly while an image builds it
pub struct AssemblyBuilder<'s> {
    name: String,
    version: String,
    scope: &'s LoadScope,
    types: Vec<Arc<TypeDef>>,
}

impl<'s> AssemblyBuilder<'s> {
    pub fn new(name: impl Into<String>, version: impl Into<String>, scope: &'s LoadScope) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            scope,
            types: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build and add a type
    pub fn define(&mut self, builder: TypeBuilder) -> Result<Arc<TypeDef>, RuntimeError> {
        let full_name = builder.full_name();
        if self.types.iter().any(|ty| ty.full_name() == full_name) {
            return Err(RuntimeError::DuplicateType(full_name));
        }
        let ty = builder.build(self.scope.token())?;
        self.types.push(ty.clone());
        Ok(ty)
    }

    /// Find a type defined so far, or one visible from the load scope
    pub fn import(&self, full_name: &str) -> Option<Arc<TypeDef>> {
        self.types
            .iter()
            .find(|ty| ty.full_name() == full_name)
            .cloned()
            .or_else(|| self.scope.find_type(full_name))
    }

    pub fn finish(self, location: Option<PathBuf>) -> Assembly {
        Assembly {
            name: self.name,
            version: self.version,
            location,
            types: self.types,
        }
    }
}
