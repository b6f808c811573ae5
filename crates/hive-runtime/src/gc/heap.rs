//! Object heap
//!
//! A slot arena with generation-checked references. Freeing a slot bumps its
//! generation, so a stale `ObjectRef` never resolves to a newer object that
//! reuses the slot.

use crate::object::{read_slot, write_slot, HeapObject, Instance};
use crate::types::{FieldDef, TypeDef, TypeRef};
use crate::value::Value;
use crate::RuntimeError;
use std::sync::Arc;

/// Reference to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    /// Slot index (for diagnostics)
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    marked: bool,
    object: Option<HeapObject>,
}

/// Managed object heap
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    allocated_bytes: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return its reference
    pub fn allocate(&mut self, object: HeapObject) -> ObjectRef {
        self.allocated_bytes += object.size_bytes();
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.marked = false;
            return ObjectRef {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            marked: false,
            object: Some(object),
        });
        ObjectRef {
            index,
            generation: 0,
        }
    }

    /// Allocate a zeroed instance without running constructors
    pub fn alloc_instance(&mut self, ty: &Arc<TypeDef>) -> ObjectRef {
        self.allocate(HeapObject::instance(ty))
    }

    pub fn alloc_string(&mut self, s: impl Into<String>) -> ObjectRef {
        self.allocate(HeapObject::string(s))
    }

    pub fn get(&self, r: ObjectRef) -> Option<&HeapObject> {
        self.slots
            .get(r.index as usize)
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    pub(crate) fn get_mut(&mut self, r: ObjectRef) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(r.index as usize)
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.object.as_mut())
    }

    /// Whether `r` still names a live object
    pub fn contains(&self, r: ObjectRef) -> bool {
        self.get(r).is_some()
    }

    /// Resolve a class instance
    pub fn instance(&self, r: ObjectRef) -> Result<&Instance, RuntimeError> {
        let object = self.get(r).ok_or(RuntimeError::StaleReference)?;
        object
            .as_instance()
            .ok_or_else(|| RuntimeError::NotAnInstance(object.type_name()))
    }

    /// Text of a string object
    pub fn string(&self, r: ObjectRef) -> Option<&str> {
        self.get(r).and_then(|o| o.as_str())
    }

    /// Runtime type check of a reference against a declared type
    pub fn is_instance_of(&self, r: ObjectRef, ty: &TypeRef) -> bool {
        let Some(object) = self.get(r) else {
            return false;
        };
        match ty {
            TypeRef::Object => true,
            TypeRef::String => object.as_str().is_some(),
            TypeRef::Named(def) if !def.is_value_type() => object
                .as_instance()
                .is_some_and(|i| i.type_def().is_assignable_to(def)),
            _ => false,
        }
    }

    /// Check a value against a declared type, including referenced classes
    pub fn check_value(&self, value: &Value, ty: &TypeRef) -> Result<(), RuntimeError> {
        if let Value::Object(r) = value {
            if !self.contains(*r) {
                return Err(RuntimeError::StaleReference);
            }
        }
        let ok = match value {
            Value::Object(r) => value.conforms_to(ty) && self.is_instance_of(*r, ty),
            other => other.conforms_to(ty),
        };
        if ok {
            Ok(())
        } else {
            Err(RuntimeError::TypeMismatch {
                expected: ty.full_name(),
                found: match value.as_object().and_then(|r| self.get(r)) {
                    Some(object) => object.type_name(),
                    None => value.kind_name().to_string(),
                },
            })
        }
    }

    /// Read a field; `target` is ignored for static fields
    pub fn load_field(
        &self,
        target: Option<ObjectRef>,
        field: &FieldDef,
    ) -> Result<Value, RuntimeError> {
        if field.is_static() {
            let owner = field.declaring_type().ok_or(RuntimeError::TypeUnloaded)?;
            let statics = owner.statics();
            return Ok(read_slot(&*statics, field));
        }

        let target = target.ok_or_else(|| RuntimeError::InstanceRequired(field.name().to_string()))?;
        let instance = self.instance(target)?;
        check_owner(instance, field)?;
        Ok(read_slot(instance, field))
    }

    /// Write a field; `target` is ignored for static fields
    pub fn store_field(
        &mut self,
        target: Option<ObjectRef>,
        field: &FieldDef,
        value: &Value,
    ) -> Result<(), RuntimeError> {
        if field.is_literal() {
            return Err(RuntimeError::ReadOnlyField(field.name().to_string()));
        }
        self.check_value(value, field.field_type())?;

        if field.is_static() {
            let owner = field.declaring_type().ok_or(RuntimeError::TypeUnloaded)?;
            let mut statics = owner.statics();
            return write_slot(&mut *statics, field, value);
        }

        let target = target.ok_or_else(|| RuntimeError::InstanceRequired(field.name().to_string()))?;
        check_owner(self.instance(target)?, field)?;
        let instance = self
            .get_mut(target)
            .and_then(|o| o.as_instance_mut())
            .ok_or(RuntimeError::StaleReference)?;
        write_slot(instance, field, value)
    }

    /// Number of live objects
    pub fn live_objects(&self) -> usize {
        self.live
    }

    /// Bytes currently accounted to live objects
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// References to every live object
    pub fn iter_refs(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|_| ObjectRef {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub(crate) fn clear_marks(&mut self) {
        self.slots.iter_mut().for_each(|slot| slot.marked = false);
    }

    /// Mark a live object; false if it was already marked or is gone
    pub(crate) fn mark(&mut self, r: ObjectRef) -> bool {
        match self.slots.get_mut(r.index as usize) {
            Some(slot) if slot.generation == r.generation && slot.object.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_marked(&self, r: ObjectRef) -> bool {
        self.slots
            .get(r.index as usize)
            .is_some_and(|slot| slot.generation == r.generation && slot.marked)
    }

    /// Release an object, invalidating every reference to it
    pub(crate) fn free(&mut self, r: ObjectRef) -> Option<HeapObject> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.marked = false;
        self.free.push(r.index);
        self.live -= 1;
        self.allocated_bytes = self.allocated_bytes.saturating_sub(object.size_bytes());
        Some(object)
    }
}

fn check_owner(instance: &Instance, field: &FieldDef) -> Result<(), RuntimeError> {
    let owner = field.declaring_type().ok_or(RuntimeError::TypeUnloaded)?;
    if instance.type_def().is_assignable_to(&owner) {
        Ok(())
    } else {
        Err(RuntimeError::FieldOwnerMismatch {
            field: field.name().to_string(),
            ty: instance.type_def().full_name(),
        })
    }
}
