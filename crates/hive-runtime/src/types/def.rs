//! Type, field and method definitions
//!
//! Definitions are immutable once built, except for static field storage.
//! Members keep a weak link to their declaring type so that a type and its
//! members share one allocation lifetime.

use super::flags::{BindingFlags, FieldAttributes, MethodAttributes, TypeAttributes, Visibility};
use super::{NativeLayout, PrimitiveType, TypeRef};
use crate::assembly::ScopeToken;
use crate::exception::ManagedException;
use crate::frame::CallFrame;
use crate::gc::ObjectRef;
use crate::value::Value;
use crate::RuntimeError;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::c_void;
use std::fmt;
use std::sync::{Arc, Weak};

/// Executable body of a method, constructor or finalizer
pub type MethodBody =
    Arc<dyn Fn(&mut CallFrame<'_>) -> Result<Value, ManagedException> + Send + Sync>;

/// Shape of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Heap-allocated reference type
    Class,
    /// Value type with sequential layout
    Struct,
    /// Value type backed by an integral primitive
    Enum(PrimitiveType),
}

/// Where a field's value lives inside its storage block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    /// Byte offset into the native data block
    Data { offset: usize },
    /// Index into the reference slots
    Reference { index: usize },
}

/// Per-type storage for static fields
#[derive(Debug, Default)]
pub struct StaticStorage {
    pub(crate) data: Vec<u8>,
    pub(crate) refs: Vec<Option<ObjectRef>>,
}

impl StaticStorage {
    pub(crate) fn new(data_size: usize, ref_slots: usize) -> Self {
        Self {
            data: vec![0; data_size],
            refs: vec![None; ref_slots],
        }
    }

    /// Heap references held by static fields
    pub fn references(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.refs.iter().flatten().copied()
    }

    /// Drop every static reference (used when the owning context unloads)
    pub fn clear_references(&mut self) {
        self.refs.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Address of a function native code may call directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeEntryPoint(usize);

impl NativeEntryPoint {
    /// Wrap a raw function address; null is rejected
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr as usize))
        }
    }

    /// The raw function address
    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// A method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeRef,
}

/// A built type
pub struct TypeDef {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) kind: TypeKind,
    pub(crate) attributes: TypeAttributes,
    pub(crate) base: Option<Arc<TypeDef>>,
    pub(crate) fields: Vec<Arc<FieldDef>>,
    pub(crate) methods: Vec<Arc<MethodDef>>,
    pub(crate) constructor: Option<MethodBody>,
    pub(crate) default_constructor: bool,
    pub(crate) finalizer: Option<MethodBody>,
    pub(crate) layout: NativeLayout,
    pub(crate) reference_slots: usize,
    pub(crate) statics: Mutex<StaticStorage>,
    pub(crate) scope: Arc<ScopeToken>,
}

impl TypeDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `Namespace.Name`, or just `Name` outside any namespace
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn attributes(&self) -> TypeAttributes {
        self.attributes
    }

    pub fn is_value_type(&self) -> bool {
        !matches!(self.kind, TypeKind::Class)
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }

    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(TypeAttributes::ABSTRACT)
    }

    /// Underlying primitive of an enum
    pub fn enum_underlying(&self) -> Option<PrimitiveType> {
        match self.kind {
            TypeKind::Enum(p) => Some(p),
            _ => None,
        }
    }

    pub fn base(&self) -> Option<&Arc<TypeDef>> {
        self.base.as_ref()
    }

    /// This type followed by every base class
    pub fn hierarchy(&self) -> impl Iterator<Item = &TypeDef> {
        std::iter::successors(Some(self), |ty| ty.base.as_deref())
    }

    /// Strict subclass test by type identity
    ///
    /// The same source type loaded into two contexts yields two distinct
    /// definitions, so names are never compared.
    pub fn is_subclass_of(&self, other: &TypeDef) -> bool {
        self.hierarchy().skip(1).any(|ty| std::ptr::eq(ty, other))
    }

    /// Identity or subclass
    pub fn is_assignable_to(&self, other: &TypeDef) -> bool {
        std::ptr::eq(self, other) || self.is_subclass_of(other)
    }

    pub fn declared_fields(&self) -> &[Arc<FieldDef>] {
        &self.fields
    }

    pub fn declared_methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    /// Fields admitted by `flags`, most-derived first
    pub fn fields(&self, flags: BindingFlags) -> Vec<Arc<FieldDef>> {
        let mut found = Vec::new();
        for (depth, ty) in self.hierarchy().enumerate() {
            found.extend(
                ty.fields
                    .iter()
                    .filter(|f| flags.admits(f.visibility, f.is_static(), depth > 0))
                    .cloned(),
            );
        }
        found
    }

    /// Methods admitted by `flags`, most-derived first
    ///
    /// An inherited method is skipped when a more derived type already
    /// declares one with the same name and signature.
    pub fn methods(&self, flags: BindingFlags) -> Vec<Arc<MethodDef>> {
        let mut found: Vec<Arc<MethodDef>> = Vec::new();
        for (depth, ty) in self.hierarchy().enumerate() {
            for method in &ty.methods {
                if !flags.admits(method.visibility, method.is_static(), depth > 0) {
                    continue;
                }
                if depth > 0 && found.iter().any(|m| m.same_signature(method)) {
                    continue;
                }
                found.push(method.clone());
            }
        }
        found
    }

    /// First field with `name` admitted by `flags`
    pub fn find_field(&self, name: &str, flags: BindingFlags) -> Option<Arc<FieldDef>> {
        self.fields(flags)
            .into_iter()
            .find(|f| flags.name_matches(&f.name, name))
    }

    /// The single method with `name` admitted by `flags`
    pub fn find_method(
        &self,
        name: &str,
        flags: BindingFlags,
    ) -> Result<Option<Arc<MethodDef>>, RuntimeError> {
        let mut matches = self
            .methods(flags)
            .into_iter()
            .filter(|m| flags.name_matches(&m.name, name));
        let first = matches.next();
        if first.is_some() && matches.next().is_some() {
            return Err(RuntimeError::AmbiguousMatch {
                ty: self.full_name(),
                member: name.to_string(),
            });
        }
        Ok(first)
    }

    /// The implementation of a virtual `method` for instances of this type
    pub fn resolve_override(&self, method: &Arc<MethodDef>) -> Arc<MethodDef> {
        if !method.is_virtual() {
            return method.clone();
        }
        self.hierarchy()
            .flat_map(|ty| ty.methods.iter())
            .find(|m| m.is_virtual() && m.same_signature(method))
            .cloned()
            .unwrap_or_else(|| method.clone())
    }

    /// Layout of the value (value types) or instance data block (classes)
    pub fn layout(&self) -> NativeLayout {
        self.layout
    }

    /// Number of reference slots in an instance, base classes included
    pub fn reference_slots(&self) -> usize {
        self.reference_slots
    }

    pub fn constructor(&self) -> Option<&MethodBody> {
        self.constructor.as_ref()
    }

    /// Whether instances can be created without arguments
    pub fn has_default_constructor(&self) -> bool {
        self.default_constructor
    }

    pub fn finalizer(&self) -> Option<&MethodBody> {
        self.finalizer.as_ref()
    }

    /// Lock the static field storage
    pub fn statics(&self) -> MutexGuard<'_, StaticStorage> {
        self.statics.lock()
    }

    /// Keep-alive token of the load scope this type was built in
    pub fn scope(&self) -> &Arc<ScopeToken> {
        &self.scope
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.full_name())
            .field("kind", &self.kind)
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// A built field
#[derive(Debug)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: TypeRef,
    pub(crate) attributes: FieldAttributes,
    pub(crate) visibility: Visibility,
    pub(crate) slot: FieldSlot,
    pub(crate) declaring: Weak<TypeDef>,
}

impl FieldDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &TypeRef {
        &self.ty
    }

    pub fn attributes(&self) -> FieldAttributes {
        self.attributes
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }

    pub fn is_literal(&self) -> bool {
        self.attributes.contains(FieldAttributes::LITERAL)
    }

    pub fn slot(&self) -> FieldSlot {
        self.slot
    }

    /// The declaring type, if it is still alive
    pub fn declaring_type(&self) -> Option<Arc<TypeDef>> {
        self.declaring.upgrade()
    }

    /// Packed flags for native hosts
    ///
    /// Bit 0 is static, bits 1..=3 hold the visibility, bit 4 is init-only and
    /// bit 5 is literal.
    pub fn packed_flags(&self) -> u32 {
        let mut flags = (self.visibility as u32) << 1;
        if self.is_static() {
            flags |= 1;
        }
        if self.attributes.contains(FieldAttributes::INIT_ONLY) {
            flags |= 1 << 4;
        }
        if self.is_literal() {
            flags |= 1 << 5;
        }
        flags
    }
}

/// A built method
pub struct MethodDef {
    pub(crate) name: String,
    pub(crate) attributes: MethodAttributes,
    pub(crate) visibility: Visibility,
    pub(crate) params: Vec<ParamDef>,
    pub(crate) return_type: TypeRef,
    pub(crate) body: Option<MethodBody>,
    pub(crate) native_entry: Option<NativeEntryPoint>,
    pub(crate) declaring: Weak<TypeDef>,
}

impl MethodDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> MethodAttributes {
        self.attributes
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    pub fn is_virtual(&self) -> bool {
        self.attributes.contains(MethodAttributes::VIRTUAL)
    }

    pub fn is_native_callable(&self) -> bool {
        self.attributes.contains(MethodAttributes::NATIVE_CALLABLE)
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn return_type(&self) -> &TypeRef {
        &self.return_type
    }

    pub fn body(&self) -> Option<&MethodBody> {
        self.body.as_ref()
    }

    pub fn native_entry(&self) -> Option<NativeEntryPoint> {
        self.native_entry
    }

    /// The declaring type, if it is still alive
    pub fn declaring_type(&self) -> Option<Arc<TypeDef>> {
        self.declaring.upgrade()
    }

    /// Same name, staticness and parameter types
    pub fn same_signature(&self, other: &MethodDef) -> bool {
        self.name == other.name
            && self.is_static() == other.is_static()
            && self.params.len() == other.params.len()
            && self.params.iter().zip(&other.params).all(|(a, b)| a.ty == b.ty)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish()
    }
}
