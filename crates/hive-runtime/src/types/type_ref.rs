//! References to types from signatures and field declarations

use super::{NativeLayout, PrimitiveType, TypeDef};
use std::fmt;
use std::sync::Arc;

/// The declared type of a field, parameter or return value
#[derive(Clone)]
pub enum TypeRef {
    /// No value (return types only)
    Void,
    /// Built-in value type
    Primitive(PrimitiveType),
    /// Heap string
    String,
    /// Any reference
    Object,
    /// User-defined class, struct or enum
    Named(Arc<TypeDef>),
}

impl TypeRef {
    /// Whether values of this type are copied rather than referenced
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeRef::Primitive(_) => true,
            TypeRef::Named(ty) => ty.is_value_type(),
            TypeRef::Void | TypeRef::String | TypeRef::Object => false,
        }
    }

    /// Native layout of a value type; `None` for references and void
    pub fn native_layout(&self) -> Option<NativeLayout> {
        match self {
            TypeRef::Primitive(p) => Some(NativeLayout::of_primitive(*p)),
            TypeRef::Named(ty) if ty.is_value_type() => Some(ty.layout()),
            _ => None,
        }
    }

    /// The primitive backing this type, looking through enums
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            TypeRef::Named(ty) => ty.enum_underlying(),
            _ => None,
        }
    }

    /// The definition behind a named type
    pub fn as_type_def(&self) -> Option<&Arc<TypeDef>> {
        match self {
            TypeRef::Named(ty) => Some(ty),
            _ => None,
        }
    }

    /// Namespace-qualified runtime name
    pub fn full_name(&self) -> String {
        match self {
            TypeRef::Void => "System.Void".to_string(),
            TypeRef::Primitive(p) => p.full_name().to_string(),
            TypeRef::String => "System.String".to_string(),
            TypeRef::Object => "System.Object".to_string(),
            TypeRef::Named(ty) => ty.full_name(),
        }
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeRef::Void, TypeRef::Void)
            | (TypeRef::String, TypeRef::String)
            | (TypeRef::Object, TypeRef::Object) => true,
            (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
            (TypeRef::Named(a), TypeRef::Named(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.full_name())
    }
}

impl From<PrimitiveType> for TypeRef {
    fn from(primitive: PrimitiveType) -> Self {
        TypeRef::Primitive(primitive)
    }
}

impl From<&Arc<TypeDef>> for TypeRef {
    fn from(ty: &Arc<TypeDef>) -> Self {
        TypeRef::Named(ty.clone())
    }
}
