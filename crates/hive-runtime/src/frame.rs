//! Method call frames
//!
//! A `CallFrame` is what a method body sees: the receiver, the arguments and
//! mutable access to the heap so it can allocate and touch fields.

use crate::exception::ManagedException;
use crate::gc::{Heap, ObjectRef};
use crate::types::{BindingFlags, MethodBody, TypeDef};
use crate::value::Value;
use crate::RuntimeError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Execution context of one method call
pub struct CallFrame<'a> {
    heap: &'a mut Heap,
    this: Option<ObjectRef>,
    args: &'a [Value],
}

impl<'a> CallFrame<'a> {
    pub fn new(heap: &'a mut Heap, this: Option<ObjectRef>, args: &'a [Value]) -> Self {
        Self { heap, this, args }
    }

    /// The receiver of an instance call
    pub fn this(&self) -> Result<ObjectRef, ManagedException> {
        self.this
            .ok_or_else(|| ManagedException::null_reference("instance method called without a receiver"))
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Result<&Value, ManagedException> {
        self.args
            .get(index)
            .ok_or_else(|| ManagedException::argument(format!("missing argument {}", index)))
    }

    pub fn heap(&self) -> &Heap {
        &*self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut *self.heap
    }

    /// Allocate a string and return it as a value
    pub fn new_string(&mut self, s: impl Into<String>) -> Value {
        Value::Object(self.heap.alloc_string(s))
    }

    /// Text of a string value
    pub fn string(&self, value: &Value) -> Result<String, ManagedException> {
        match value {
            Value::Null => Err(ManagedException::null_reference("string is null")),
            Value::Object(r) => self
                .heap
                .string(*r)
                .map(str::to_string)
                .ok_or_else(|| ManagedException::new("System.InvalidCastException", "object is not a string")),
            other => Err(ManagedException::new(
                "System.InvalidCastException",
                format!("{} is not a string", other.kind_name()),
            )),
        }
    }

    /// Read an instance field by name
    pub fn get_field(&self, target: ObjectRef, name: &str) -> Result<Value, ManagedException> {
        let ty = self.heap.instance(target)?.type_def().clone();
        let field = ty
            .find_field(name, BindingFlags::ALL)
            .ok_or_else(|| missing_field(&ty, name))?;
        Ok(self.heap.load_field(Some(target), &field)?)
    }

    /// Write an instance field by name
    pub fn set_field(
        &mut self,
        target: ObjectRef,
        name: &str,
        value: Value,
    ) -> Result<(), ManagedException> {
        let ty = self.heap.instance(target)?.type_def().clone();
        let field = ty
            .find_field(name, BindingFlags::ALL)
            .ok_or_else(|| missing_field(&ty, name))?;
        Ok(self.heap.store_field(Some(target), &field, &value)?)
    }

    /// Read a static field of `ty` by name
    pub fn get_static(&self, ty: &TypeDef, name: &str) -> Result<Value, ManagedException> {
        let field = ty
            .find_field(name, BindingFlags::ALL)
            .filter(|f| f.is_static())
            .ok_or_else(|| missing_field(ty, name))?;
        Ok(self.heap.load_field(None, &field)?)
    }

    /// Write a static field of `ty` by name
    pub fn set_static(&mut self, ty: &TypeDef, name: &str, value: Value) -> Result<(), ManagedException> {
        let field = ty
            .find_field(name, BindingFlags::ALL)
            .filter(|f| f.is_static())
            .ok_or_else(|| missing_field(ty, name))?;
        Ok(self.heap.store_field(None, &field, &value)?)
    }

    /// Create an instance through its default constructor
    pub fn construct(&mut self, ty: &Arc<TypeDef>) -> Result<Value, ManagedException> {
        Ok(Value::Object(construct_object(&mut *self.heap, ty)?))
    }
}

fn missing_field(ty: &TypeDef, name: &str) -> ManagedException {
    ManagedException::new(
        "System.MissingFieldException",
        format!("Field {}.{} not found", ty.full_name(), name),
    )
}

/// Run a body, turning panics into managed exceptions
pub fn run_guarded(body: &MethodBody, frame: &mut CallFrame<'_>) -> Result<Value, ManagedException> {
    match catch_unwind(AssertUnwindSafe(|| body(frame))) {
        Ok(result) => result,
        Err(payload) => Err(ManagedException::from_panic(payload)),
    }
}

/// Allocate an instance and run its constructors, base class first
pub fn construct_object(heap: &mut Heap, ty: &Arc<TypeDef>) -> Result<ObjectRef, RuntimeError> {
    if ty.is_value_type() {
        return Err(RuntimeError::NotAClass(ty.full_name()));
    }
    if ty.is_abstract() {
        return Err(RuntimeError::AbstractType(ty.full_name()));
    }
    if !ty.has_default_constructor() {
        return Err(RuntimeError::NoDefaultConstructor(ty.full_name()));
    }

    let constructors: Vec<MethodBody> = ty
        .hierarchy()
        .filter_map(|t| t.constructor().cloned())
        .collect();

    let object = heap.alloc_instance(ty);
    for ctor in constructors.iter().rev() {
        let mut frame = CallFrame::new(&mut *heap, Some(object), &[]);
        run_guarded(ctor, &mut frame)?;
    }
    Ok(object)
}
