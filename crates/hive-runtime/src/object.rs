//! Heap object representation
//!
//! A class instance stores its value-type fields in an aligned native data
//! block (so a pinned instance can be read by native code directly) and its
//! reference fields in a separate slot array the collector can trace.

use crate::gc::ObjectRef;
use crate::types::{AlignedBytes, FieldDef, FieldSlot, MethodBody, StaticStorage, TypeDef};
use crate::value::Value;
use crate::RuntimeError;
use std::sync::Arc;

/// Fixed per-object overhead used for heap accounting
const OBJECT_HEADER_BYTES: usize = 16;

/// Instance of a class
#[derive(Debug)]
pub struct Instance {
    ty: Arc<TypeDef>,
    data: AlignedBytes,
    refs: Box<[Option<ObjectRef>]>,
}

impl Instance {
    /// Zero-initialised instance
    pub fn new(ty: &Arc<TypeDef>) -> Self {
        Self {
            ty: ty.clone(),
            data: AlignedBytes::zeroed(ty.layout().size),
            refs: vec![None; ty.reference_slots()].into_boxed_slice(),
        }
    }

    pub fn type_def(&self) -> &Arc<TypeDef> {
        &self.ty
    }

    /// Native data block
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Stable address of the native data block
    pub fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

/// What a heap slot holds
#[derive(Debug)]
pub enum ObjectKind {
    Instance(Instance),
    String(String),
}

/// An object living on the managed heap
#[derive(Debug)]
pub struct HeapObject {
    kind: ObjectKind,
    finalized: bool,
}

impl HeapObject {
    pub fn instance(ty: &Arc<TypeDef>) -> Self {
        Self {
            kind: ObjectKind::Instance(Instance::new(ty)),
            finalized: false,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::String(s.into()),
            finalized: false,
        }
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match &self.kind {
            ObjectKind::Instance(i) => Some(i),
            ObjectKind::String(_) => None,
        }
    }

    pub(crate) fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match &mut self.kind {
            ObjectKind::Instance(i) => Some(i),
            ObjectKind::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::String(s) => Some(s),
            ObjectKind::Instance(_) => None,
        }
    }

    /// Runtime type name
    pub fn type_name(&self) -> String {
        match &self.kind {
            ObjectKind::Instance(i) => i.ty.full_name(),
            ObjectKind::String(_) => "System.String".to_string(),
        }
    }

    /// Outgoing references
    pub fn references(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        let refs: &[Option<ObjectRef>] = match &self.kind {
            ObjectKind::Instance(i) => &i.refs[..],
            ObjectKind::String(_) => &[],
        };
        refs.iter().flatten().copied()
    }

    /// Finalizer still owed to this object
    pub(crate) fn pending_finalizer(&self) -> Option<MethodBody> {
        if self.finalized {
            return None;
        }
        self.as_instance()
            .and_then(|i| i.ty.hierarchy().find_map(|ty| ty.finalizer().cloned()))
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// Approximate size for heap accounting
    pub fn size_bytes(&self) -> usize {
        OBJECT_HEADER_BYTES
            + match &self.kind {
                ObjectKind::Instance(i) => {
                    i.data.len() + i.refs.len() * std::mem::size_of::<Option<ObjectRef>>()
                }
                ObjectKind::String(s) => s.len(),
            }
    }
}

/// Storage that holds field values in data bytes plus reference slots
pub(crate) trait SlotStore {
    fn data(&self) -> &[u8];
    fn data_mut(&mut self) -> &mut [u8];
    fn refs(&self) -> &[Option<ObjectRef>];
    fn refs_mut(&mut self) -> &mut [Option<ObjectRef>];
}

impl SlotStore for Instance {
    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
    fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }
    fn refs(&self) -> &[Option<ObjectRef>] {
        &self.refs
    }
    fn refs_mut(&mut self) -> &mut [Option<ObjectRef>] {
        &mut self.refs
    }
}

impl SlotStore for StaticStorage {
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
    fn refs(&self) -> &[Option<ObjectRef>] {
        &self.refs
    }
    fn refs_mut(&mut self) -> &mut [Option<ObjectRef>] {
        &mut self.refs
    }
}

pub(crate) fn read_slot<S: SlotStore + ?Sized>(store: &S, field: &FieldDef) -> Value {
    match field.slot() {
        FieldSlot::Data { offset } => store
            .data()
            .get(offset..)
            .and_then(|bytes| Value::read_native(field.field_type(), bytes))
            .unwrap_or_else(|| Value::zero(field.field_type())),
        FieldSlot::Reference { index } => store
            .refs()
            .get(index)
            .copied()
            .flatten()
            .map_or(Value::Null, Value::Object),
    }
}

pub(crate) fn write_slot<S: SlotStore + ?Sized>(
    store: &mut S,
    field: &FieldDef,
    value: &Value,
) -> Result<(), RuntimeError> {
    let mismatch = || RuntimeError::TypeMismatch {
        expected: field.field_type().full_name(),
        found: value.kind_name().to_string(),
    };
    match field.slot() {
        FieldSlot::Data { offset } => {
            let bytes = store.data_mut().get_mut(offset..).ok_or_else(mismatch)?;
            if value.write_native(field.field_type(), bytes) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        FieldSlot::Reference { index } => {
            let target = match value {
                Value::Null => None,
                Value::Object(r) => Some(*r),
                _ => return Err(mismatch()),
            };
            let slot = store.refs_mut().get_mut(index).ok_or_else(mismatch)?;
            *slot = target;
            Ok(())
        }
    }
}
