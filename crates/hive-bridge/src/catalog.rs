//! Reflection catalog
//!
//! Per-context nested tables: context → assembly → type → {method, field}.
//! Tables fill lazily. An assembly's types are catalogued in one batch the
//! first time they are requested; members get IDs as enumerations and lookups
//! reach them, and an ID once issued keeps naming the same member.

use crate::bridge::Bridge;
use crate::context::ContextRecord;
use crate::delegate::DelegateThunk;
use crate::error::{log_failure, BridgeError, BridgeResult};
use crate::ids::{AssemblyId, ClassId, ContextId, FieldId, HandleAllocator, MethodId};
use crate::table::IdTable;
use hive_runtime::{Assembly, BindingFlags, FieldDef, MethodDef, ObjectRef, TypeDef};
use std::sync::Arc;

/// A loaded assembly and its type table
#[derive(Debug)]
pub(crate) struct AssemblyRecord {
    pub assembly: Arc<Assembly>,
    types: IdTable<ClassId, TypeRecord>,
    enumerated: bool,
}

impl AssemblyRecord {
    pub fn new(assembly: Arc<Assembly>) -> Self {
        Self {
            assembly,
            types: IdTable::new(),
            enumerated: false,
        }
    }

    /// Type IDs in definition order, cataloguing them on first use
    pub fn enumerate_types(&mut self, ids: &mut HandleAllocator) -> Vec<ClassId> {
        if !self.enumerated {
            for ty in self.assembly.types() {
                self.types
                    .insert(ClassId::from(ids.next_id()), TypeRecord::new(ty.clone()));
            }
            self.enumerated = true;
        }
        self.types.keys().collect()
    }
}

/// A catalogued type and its member tables
#[derive(Debug)]
pub(crate) struct TypeRecord {
    pub ty: Arc<TypeDef>,
    methods: IdTable<MethodId, MethodRecord>,
    fields: IdTable<FieldId, FieldRecord>,
}

impl TypeRecord {
    fn new(ty: Arc<TypeDef>) -> Self {
        Self {
            ty,
            methods: IdTable::new(),
            fields: IdTable::new(),
        }
    }

    fn method_id(&mut self, ids: &mut HandleAllocator, method: &Arc<MethodDef>) -> MethodId {
        if let Some(id) = self.methods.find_key(|r| Arc::ptr_eq(&r.method, method)) {
            return id;
        }
        let id = MethodId::from(ids.next_id());
        self.methods.insert(id, MethodRecord::new(method.clone()));
        id
    }

    fn field_id(&mut self, ids: &mut HandleAllocator, field: &Arc<FieldDef>) -> FieldId {
        if let Some(id) = self.fields.find_key(|r| Arc::ptr_eq(&r.field, field)) {
            return id;
        }
        let id = FieldId::from(ids.next_id());
        self.fields.insert(id, FieldRecord { field: field.clone() });
        id
    }

    /// IDs of the methods admitted by `flags`
    pub fn enumerate_methods(&mut self, ids: &mut HandleAllocator, flags: BindingFlags) -> Vec<MethodId> {
        let methods = self.ty.methods(flags);
        methods.iter().map(|m| self.method_id(ids, m)).collect()
    }

    /// IDs of the fields admitted by `flags`; new fields are appended
    pub fn enumerate_fields(&mut self, ids: &mut HandleAllocator, flags: BindingFlags) -> Vec<FieldId> {
        let fields = self.ty.fields(flags);
        fields.iter().map(|f| self.field_id(ids, f)).collect()
    }

    pub fn method_by_name(
        &mut self,
        ids: &mut HandleAllocator,
        name: &str,
        flags: BindingFlags,
    ) -> BridgeResult<MethodId> {
        match self.ty.find_method(name, flags) {
            Ok(Some(method)) => Ok(self.method_id(ids, &method)),
            Ok(None) => Err(BridgeError::MethodNotFound {
                name: name.to_string(),
            }),
            Err(_) => Err(BridgeError::AmbiguousMethod {
                name: name.to_string(),
            }),
        }
    }

    #[cfg(test)]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    #[cfg(test)]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A catalogued method and its lazily built delegate
#[derive(Debug)]
pub(crate) struct MethodRecord {
    pub method: Arc<MethodDef>,
    pub delegate: Option<Box<DelegateThunk>>,
}

impl MethodRecord {
    fn new(method: Arc<MethodDef>) -> Self {
        Self {
            method,
            delegate: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FieldRecord {
    pub field: Arc<FieldDef>,
}

/// Context table and chain resolution
#[derive(Debug, Default)]
pub(crate) struct ReflectionCatalog {
    contexts: IdTable<ContextId, ContextRecord>,
}

impl ReflectionCatalog {
    pub fn insert(&mut self, id: ContextId, record: ContextRecord) {
        self.contexts.insert(id, record);
    }

    pub fn remove(&mut self, id: ContextId) -> Option<ContextRecord> {
        self.contexts.remove(id)
    }

    pub fn context_ids(&self) -> Vec<ContextId> {
        self.contexts.keys().collect()
    }

    pub fn context(&self, ctx: ContextId) -> BridgeResult<&ContextRecord> {
        self.contexts.get(ctx).ok_or(BridgeError::InvalidContext(ctx))
    }

    pub fn context_mut(&mut self, ctx: ContextId) -> BridgeResult<&mut ContextRecord> {
        self.contexts.get_mut(ctx).ok_or(BridgeError::InvalidContext(ctx))
    }

    pub fn assembly(&self, ctx: ContextId, asm: AssemblyId) -> BridgeResult<&AssemblyRecord> {
        self.context(ctx)?
            .assemblies
            .get(asm)
            .ok_or(BridgeError::InvalidAssembly(asm))
    }

    pub fn assembly_mut(&mut self, ctx: ContextId, asm: AssemblyId) -> BridgeResult<&mut AssemblyRecord> {
        self.context_mut(ctx)?
            .assemblies
            .get_mut(asm)
            .ok_or(BridgeError::InvalidAssembly(asm))
    }

    pub fn class(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<&TypeRecord> {
        self.assembly(ctx, asm)?
            .types
            .get(cls)
            .ok_or(BridgeError::InvalidClass(cls))
    }

    pub fn class_mut(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
    ) -> BridgeResult<&mut TypeRecord> {
        self.assembly_mut(ctx, asm)?
            .types
            .get_mut(cls)
            .ok_or(BridgeError::InvalidClass(cls))
    }

    pub fn method(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<&MethodRecord> {
        self.class(ctx, asm, cls)?
            .methods
            .get(method)
            .ok_or(BridgeError::InvalidMethod(method))
    }

    pub fn method_mut(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<&mut MethodRecord> {
        self.class_mut(ctx, asm, cls)?
            .methods
            .get_mut(method)
            .ok_or(BridgeError::InvalidMethod(method))
    }

    pub fn field(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
    ) -> BridgeResult<&FieldRecord> {
        self.class(ctx, asm, cls)?
            .fields
            .get(field)
            .ok_or(BridgeError::InvalidField(field))
    }

    /// Static reference fields of every loaded type; collection roots
    pub fn static_roots(&self) -> Vec<ObjectRef> {
        self.contexts
            .values()
            .flat_map(|ctx| ctx.assemblies())
            .flat_map(|asm| asm.static_references())
            .collect()
    }

    /// Assemblies of permanent contexts, importable from anywhere
    pub fn shared_assemblies(&self) -> Vec<Arc<Assembly>> {
        self.contexts
            .values()
            .filter(|ctx| !ctx.can_unload)
            .flat_map(|ctx| ctx.assemblies().cloned())
            .collect()
    }
}

impl Bridge {
    /// IDs of every type in an assembly, in definition order
    pub fn types_of_assembly(&mut self, ctx: ContextId, asm: AssemblyId) -> BridgeResult<Vec<ClassId>> {
        let ids = &mut self.ids;
        self.catalog
            .assembly_mut(ctx, asm)
            .map(|record| record.enumerate_types(ids))
            .inspect_err(|e| log_failure("Unable to load classes from assembly", e))
    }

    /// IDs of the public instance and static methods of a type
    pub fn methods_of_type(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
    ) -> BridgeResult<Vec<MethodId>> {
        self.methods_of_type_with(ctx, asm, cls, BindingFlags::DEFAULT_LOOKUP)
    }

    pub fn methods_of_type_with(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        flags: BindingFlags,
    ) -> BridgeResult<Vec<MethodId>> {
        let ids = &mut self.ids;
        self.catalog
            .class_mut(ctx, asm, cls)
            .map(|record| record.enumerate_methods(ids, flags))
            .inspect_err(|e| log_failure("Unable to load methods from class", e))
    }

    /// IDs of the fields admitted by `flags`
    ///
    /// A later scan with wider flags appends the newly visible fields; fields
    /// already catalogued keep their IDs.
    pub fn fields_of_type(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        flags: BindingFlags,
    ) -> BridgeResult<Vec<FieldId>> {
        let ids = &mut self.ids;
        self.catalog
            .class_mut(ctx, asm, cls)
            .map(|record| record.enumerate_fields(ids, flags))
            .inspect_err(|e| log_failure("Unable to load fields from class", e))
    }

    pub fn class_name(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<String> {
        self.class_query(ctx, asm, cls, "Unable to get class name", |ty| ty.name().to_string())
    }

    /// Namespace of a type, empty when it has none
    pub fn class_namespace(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<String> {
        self.class_query(ctx, asm, cls, "Unable to get class namespace", |ty| {
            ty.namespace().unwrap_or_default().to_string()
        })
    }

    pub fn class_full_name(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<String> {
        self.class_query(ctx, asm, cls, "Unable to get class full name", |ty| ty.full_name())
    }

    pub fn class_is_value_type(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<bool> {
        self.class_query(ctx, asm, cls, "Unable to check whether class is a value type", |ty| {
            ty.is_value_type()
        })
    }

    pub fn class_is_enum(&self, ctx: ContextId, asm: AssemblyId, cls: ClassId) -> BridgeResult<bool> {
        self.class_query(ctx, asm, cls, "Unable to check whether class is an enum", |ty| {
            ty.is_enum()
        })
    }

    /// Whether the first type strictly derives from the second
    ///
    /// Both chains are resolved independently, so the types may live in
    /// different contexts.
    #[allow(clippy::too_many_arguments)]
    pub fn class_is_subclass_of(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        base_ctx: ContextId,
        base_asm: AssemblyId,
        base_cls: ClassId,
    ) -> BridgeResult<bool> {
        self.resolve_derivation(ctx, asm, cls, base_ctx, base_asm, base_cls)
            .inspect_err(|e| log_failure("Unable to check class derivation", e))
    }

    /// ID of the single method named `name` admitted by `flags`
    pub fn find_method_by_name(
        &mut self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        name: &str,
        flags: BindingFlags,
    ) -> BridgeResult<MethodId> {
        let ids = &mut self.ids;
        self.catalog
            .class_mut(ctx, asm, cls)
            .and_then(|record| record.method_by_name(ids, name, flags))
            .inspect_err(|e| log_failure("Unable to get method by name", e))
    }

    pub fn method_name(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<String> {
        self.method_query(ctx, asm, cls, method, "Unable to get method name", |m| {
            m.name().to_string()
        })
    }

    pub fn method_param_count(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<usize> {
        self.method_query(ctx, asm, cls, method, "Unable to get method parameter count", |m| {
            m.params().len()
        })
    }

    pub fn method_return_type_name(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<String> {
        self.method_query(ctx, asm, cls, method, "Unable to get method return type", |m| {
            m.return_type().full_name()
        })
    }

    pub fn method_is_static(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
    ) -> BridgeResult<bool> {
        self.method_query(ctx, asm, cls, method, "Unable to check whether method is static", |m| {
            m.is_static()
        })
    }

    pub fn field_name(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
    ) -> BridgeResult<String> {
        self.field_query(ctx, asm, cls, field, "Unable to get field name", |f| f.name().to_string())
    }

    /// Runtime full name of a field's type
    pub fn field_type_name(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
    ) -> BridgeResult<String> {
        self.field_query(ctx, asm, cls, field, "Unable to get field type name", |f| {
            f.field_type().full_name()
        })
    }

    /// Packed field attributes, see [`FieldDef::packed_flags`]
    pub fn field_flags(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
    ) -> BridgeResult<u32> {
        self.field_query(ctx, asm, cls, field, "Unable to get field flags", |f| f.packed_flags())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_derivation(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        base_ctx: ContextId,
        base_asm: AssemblyId,
        base_cls: ClassId,
    ) -> BridgeResult<bool> {
        let derived = self
            .catalog
            .class(ctx, asm, cls)
            .map_err(|e| BridgeError::Derived(Box::new(e)))?;
        let base = self
            .catalog
            .class(base_ctx, base_asm, base_cls)
            .map_err(|e| BridgeError::Base(Box::new(e)))?;
        Ok(derived.ty.is_subclass_of(&base.ty))
    }

    fn class_query<T>(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        action: &str,
        query: impl FnOnce(&TypeDef) -> T,
    ) -> BridgeResult<T> {
        self.catalog
            .class(ctx, asm, cls)
            .map(|record| query(record.ty.as_ref()))
            .inspect_err(|e| log_failure(action, e))
    }

    fn method_query<T>(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        method: MethodId,
        action: &str,
        query: impl FnOnce(&MethodDef) -> T,
    ) -> BridgeResult<T> {
        self.catalog
            .method(ctx, asm, cls, method)
            .map(|record| query(record.method.as_ref()))
            .inspect_err(|e| log_failure(action, e))
    }

    fn field_query<T>(
        &self,
        ctx: ContextId,
        asm: AssemblyId,
        cls: ClassId,
        field: FieldId,
        action: &str,
        query: impl FnOnce(&FieldDef) -> T,
    ) -> BridgeResult<T> {
        self.catalog
            .field(ctx, asm, cls, field)
            .map(|record| query(record.field.as_ref()))
            .inspect_err(|e| log_failure(action, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_runtime::{AssemblyBuilder, LoadScope, MethodBuilder, PrimitiveType, ScopeToken, TypeBuilder, Value};

    fn sample_assembly() -> Arc<Assembly> {
        let scope = LoadScope::new(ScopeToken::new("test", false), Vec::new());
        let mut builder = AssemblyBuilder::new("Sample", "1.0.0", &scope);
        builder
            .define(
                TypeBuilder::class("Game", "Player")
                    .field("Health", PrimitiveType::Int32)
                    .private_field("secret", PrimitiveType::Int32)
                    .method(MethodBuilder::instance("Jump").body(|_| Ok(Value::Void)))
                    .method(MethodBuilder::static_method("Spawn").body(|_| Ok(Value::Void))),
            )
            .unwrap();
        builder
            .define(TypeBuilder::structure("Game", "Vector3").field("X", PrimitiveType::Single))
            .unwrap();
        Arc::new(builder.finish(None))
    }

    #[test]
    fn test_types_enumerated_once() {
        let mut ids = HandleAllocator::new();
        let mut record = AssemblyRecord::new(sample_assembly());
        let first = record.enumerate_types(&mut ids);
        let second = record.enumerate_types(&mut ids);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_incremental_field_scan() {
        let mut ids = HandleAllocator::new();
        let mut assembly = AssemblyRecord::new(sample_assembly());
        let player = assembly.enumerate_types(&mut ids)[0];
        let record = assembly.types.get_mut(player).unwrap();

        let public = record.enumerate_fields(&mut ids, BindingFlags::PUBLIC | BindingFlags::INSTANCE);
        assert_eq!(public.len(), 1);

        let all = record.enumerate_fields(
            &mut ids,
            BindingFlags::PUBLIC | BindingFlags::NON_PUBLIC | BindingFlags::INSTANCE,
        );
        assert_eq!(all.len(), 2);
        assert!(all.contains(&public[0]));
        assert_eq!(record.field_count(), 2);
    }

    #[test]
    fn test_method_lookup_reuses_ids() {
        let mut ids = HandleAllocator::new();
        let mut assembly = AssemblyRecord::new(sample_assembly());
        let player = assembly.enumerate_types(&mut ids)[0];
        let record = assembly.types.get_mut(player).unwrap();

        let methods = record.enumerate_methods(&mut ids, BindingFlags::DEFAULT_LOOKUP);
        assert_eq!(methods.len(), 2);
        let jump = record
            .method_by_name(&mut ids, "Jump", BindingFlags::DEFAULT_LOOKUP)
            .unwrap();
        assert!(methods.contains(&jump));
        assert_eq!(record.method_count(), 2);

        assert!(matches!(
            record.method_by_name(&mut ids, "Fly", BindingFlags::DEFAULT_LOOKUP),
            Err(BridgeError::MethodNotFound { .. })
        ));
    }
}
