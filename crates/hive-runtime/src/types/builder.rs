//! Programmatic construction of types
//!
//! Images describe their types through `TypeBuilder` and `MethodBuilder`;
//! building computes native layouts, assigns field slots and seeds static
//! storage with literal values.

use super::def::{FieldDef, FieldSlot, MethodBody, MethodDef, NativeEntryPoint, ParamDef, StaticStorage, TypeDef, TypeKind};
use super::flags::{FieldAttributes, MethodAttributes, TypeAttributes, Visibility};
use super::{LayoutBuilder, NativeLayout, PrimitiveType, TypeRef};
use crate::assembly::ScopeToken;
use crate::exception::ManagedException;
use crate::frame::CallFrame;
use crate::value::Value;
use crate::RuntimeError;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::Arc;

struct FieldSpec {
    name: String,
    ty: TypeRef,
    attributes: FieldAttributes,
    visibility: Visibility,
    literal: Option<Value>,
}

/// Builder for a single type
pub struct TypeBuilder {
    name: String,
    namespace: Option<String>,
    kind: TypeKind,
    attributes: TypeAttributes,
    base: Option<Arc<TypeDef>>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodBuilder>,
    constructor: Option<MethodBody>,
    default_constructor: bool,
    finalizer: Option<MethodBody>,
}

impl TypeBuilder {
    fn new(namespace: &str, name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            kind,
            attributes: TypeAttributes::PUBLIC,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
            constructor: None,
            default_constructor: true,
            finalizer: None,
        }
    }

    /// A reference type; an empty namespace means none
    pub fn class(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, TypeKind::Class)
    }

    /// A value type with sequential layout
    pub fn structure(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, TypeKind::Struct)
    }

    /// An enum backed by `underlying`
    pub fn enumeration(namespace: &str, name: &str, underlying: PrimitiveType) -> Self {
        Self::new(namespace, name, TypeKind::Enum(underlying))
    }

    pub fn base(mut self, base: &Arc<TypeDef>) -> Self {
        self.base = Some(base.clone());
        self
    }

    pub fn attributes(mut self, attributes: TypeAttributes) -> Self {
        self.attributes |= attributes;
        self
    }

    /// Public instance field
    pub fn field(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.field_with(name, ty, Visibility::Public, FieldAttributes::empty())
    }

    /// Private instance field
    pub fn private_field(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.field_with(name, ty, Visibility::Private, FieldAttributes::empty())
    }

    /// Public static field
    pub fn static_field(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.field_with(name, ty, Visibility::Public, FieldAttributes::STATIC)
    }

    pub fn field_with(
        mut self,
        name: &str,
        ty: impl Into<TypeRef>,
        visibility: Visibility,
        attributes: FieldAttributes,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            ty: ty.into(),
            attributes,
            visibility,
            literal: None,
        });
        self
    }

    /// Public constant; its type is the primitive of `value`
    pub fn literal(mut self, name: &str, value: Value) -> Self {
        let ty = value
            .primitive_type()
            .map(TypeRef::Primitive)
            .unwrap_or(TypeRef::Void);
        self.fields.push(FieldSpec {
            name: name.to_string(),
            ty,
            attributes: FieldAttributes::STATIC | FieldAttributes::LITERAL,
            visibility: Visibility::Public,
            literal: Some(value),
        });
        self
    }

    /// Enum constant stored in the underlying primitive
    pub fn variant(self, name: &str, value: i64) -> Self {
        let literal = match self.kind {
            TypeKind::Enum(p) => Value::from_integral(p, value),
            _ => None,
        };
        match literal {
            Some(v) => self.literal(name, v),
            // Kept as void so `build` reports the bad constant.
            None => self.literal(name, Value::Void),
        }
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    /// Parameterless constructor run after the base constructors
    pub fn constructor<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<Value, ManagedException> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(body));
        self.default_constructor = true;
        self
    }

    /// Mark the type as having only parameterised constructors
    pub fn without_default_constructor(mut self) -> Self {
        self.constructor = None;
        self.default_constructor = false;
        self
    }

    pub fn finalizer<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<Value, ManagedException> + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(body));
        self
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Build the type inside `scope`
    pub fn build(self, scope: &Arc<ScopeToken>) -> Result<Arc<TypeDef>, RuntimeError> {
        let full_name = self.full_name();
        let is_value_type = !matches!(self.kind, TypeKind::Class);

        if let Some(base) = &self.base {
            let reason = if is_value_type {
                Some("value types cannot declare a base class")
            } else if base.is_value_type() {
                Some("base type is a value type")
            } else if base.attributes().contains(TypeAttributes::SEALED) {
                Some("base type is sealed")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(RuntimeError::InvalidBase {
                    ty: full_name,
                    reason: reason.to_string(),
                });
            }
        }
        if let TypeKind::Enum(p) = self.kind {
            if !p.is_integral() {
                return Err(RuntimeError::InvalidBase {
                    ty: full_name,
                    reason: format!("{} cannot back an enum", p.full_name()),
                });
            }
        }

        let (mut data, mut reference_slots) = match &self.base {
            Some(base) => (LayoutBuilder::extend(base.layout()), base.reference_slots()),
            None => (LayoutBuilder::new(), 0),
        };
        let mut static_data = LayoutBuilder::new();
        let mut static_refs = 0;
        let mut slots = Vec::with_capacity(self.fields.len());

        for spec in &self.fields {
            let is_static = spec.attributes.contains(FieldAttributes::STATIC);
            let invalid = |reason: &str| RuntimeError::InvalidField {
                ty: full_name.clone(),
                field: spec.name.clone(),
                reason: reason.to_string(),
            };

            if spec.ty == TypeRef::Void {
                return Err(invalid("field type cannot be void"));
            }
            if spec.attributes.contains(FieldAttributes::LITERAL) && !spec.ty.is_value_type() {
                return Err(invalid("constants must be value types"));
            }
            if !is_static && matches!(self.kind, TypeKind::Enum(_)) {
                return Err(invalid("enums cannot declare instance fields"));
            }
            if !is_static && is_value_type && !spec.ty.is_value_type() {
                return Err(invalid("value types may only contain value-type fields"));
            }

            let slot = match (spec.ty.native_layout(), is_static) {
                (Some(layout), false) => FieldSlot::Data {
                    offset: data.push(layout),
                },
                (Some(layout), true) => FieldSlot::Data {
                    offset: static_data.push(layout),
                },
                (None, false) => {
                    reference_slots += 1;
                    FieldSlot::Reference {
                        index: reference_slots - 1,
                    }
                }
                (None, true) => {
                    static_refs += 1;
                    FieldSlot::Reference {
                        index: static_refs - 1,
                    }
                }
            };
            slots.push(slot);
        }

        let layout = match self.kind {
            TypeKind::Enum(p) => NativeLayout::of_primitive(p),
            TypeKind::Struct => data.finish_value_type(),
            TypeKind::Class => data.finish(),
        };

        let mut statics = StaticStorage::new(static_data.finish().size, static_refs);
        for (spec, slot) in self.fields.iter().zip(&slots) {
            let (Some(value), FieldSlot::Data { offset }) = (&spec.literal, slot) else {
                continue;
            };
            if !value.write_native(&spec.ty, &mut statics.data[*offset..]) {
                return Err(RuntimeError::InvalidField {
                    ty: full_name,
                    field: spec.name.clone(),
                    reason: "constant does not fit the declared type".to_string(),
                });
            }
        }

        let default_constructor = self.default_constructor && !self.attributes.contains(TypeAttributes::ABSTRACT);
        let TypeBuilder {
            name,
            namespace,
            kind,
            attributes,
            base,
            fields,
            methods,
            constructor,
            finalizer,
            ..
        } = self;

        Ok(Arc::new_cyclic(|declaring| TypeDef {
            name,
            namespace,
            kind,
            attributes,
            base,
            fields: fields
                .into_iter()
                .zip(slots)
                .map(|(spec, slot)| {
                    Arc::new(FieldDef {
                        name: spec.name,
                        ty: spec.ty,
                        attributes: spec.attributes,
                        visibility: spec.visibility,
                        slot,
                        declaring: declaring.clone(),
                    })
                })
                .collect(),
            methods: methods
                .into_iter()
                .map(|m| {
                    Arc::new(MethodDef {
                        name: m.name,
                        attributes: m.attributes,
                        visibility: m.visibility,
                        params: m.params,
                        return_type: m.return_type,
                        body: m.body,
                        native_entry: m.native_entry,
                        declaring: declaring.clone(),
                    })
                })
                .collect(),
            constructor,
            default_constructor,
            finalizer,
            layout,
            reference_slots,
            statics: Mutex::new(statics),
            scope: scope.clone(),
        }))
    }
}

/// Builder for a method
pub struct MethodBuilder {
    name: String,
    attributes: MethodAttributes,
    visibility: Visibility,
    params: Vec<ParamDef>,
    return_type: TypeRef,
    body: Option<MethodBody>,
    native_entry: Option<NativeEntryPoint>,
}

impl MethodBuilder {
    /// Public instance method returning void
    pub fn instance(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: MethodAttributes::empty(),
            visibility: Visibility::Public,
            params: Vec::new(),
            return_type: TypeRef::Void,
            body: None,
            native_entry: None,
        }
    }

    /// Public static method returning void
    pub fn static_method(name: &str) -> Self {
        let mut method = Self::instance(name);
        method.attributes |= MethodAttributes::STATIC;
        method
    }

    pub fn param(mut self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.params.push(ParamDef {
            name: name.to_string(),
            ty: ty.into(),
        });
        self
    }

    pub fn returns(mut self, ty: impl Into<TypeRef>) -> Self {
        self.return_type = ty.into();
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn virtual_dispatch(mut self) -> Self {
        self.attributes |= MethodAttributes::VIRTUAL;
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<Value, ManagedException> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Expose a native entry point native code may call directly
    ///
    /// A null pointer leaves the method managed-only.
    pub fn native_entry(mut self, entry: *const c_void) -> Self {
        self.native_entry = NativeEntryPoint::from_ptr(entry);
        if self.native_entry.is_some() {
            self.attributes |= MethodAttributes::NATIVE_CALLABLE;
        }
        self
    }
}
