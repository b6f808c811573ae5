//! Managed values
//!
//! Value types carry their bits inline; reference types are heap references.
//! `read_native`/`write_native` convert between a value and its native bytes
//! using the declared type's layout.

use crate::gc::ObjectRef;
use crate::types::{PrimitiveType, TypeDef, TypeRef};
use std::fmt;
use std::sync::Arc;

/// A managed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value (void returns)
    Void,
    /// Null reference
    Null,
    Bool(bool),
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    IntPtr(isize),
    UIntPtr(usize),
    /// Value-type instance in native layout
    Struct(StructValue),
    /// Heap reference
    Object(ObjectRef),
}

macro_rules! read_ne {
    ($t:ty, $bytes:expr) => {
        <$t>::from_ne_bytes($bytes.get(..std::mem::size_of::<$t>())?.try_into().ok()?)
    };
}

macro_rules! write_ne {
    ($v:expr, $out:expr) => {{
        let bytes = $v.to_ne_bytes();
        match $out.get_mut(..bytes.len()) {
            Some(slot) => {
                slot.copy_from_slice(&bytes);
                true
            }
            None => false,
        }
    }};
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Any integral value widened to i64
    pub fn to_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Char(v) => v as i64,
            Value::I8(v) => v as i64,
            Value::U8(v) => v as i64,
            Value::I16(v) => v as i64,
            Value::U16(v) => v as i64,
            Value::I32(v) => v as i64,
            Value::U32(v) => v as i64,
            Value::I64(v) => v,
            Value::U64(v) => v as i64,
            Value::IntPtr(v) => v as i64,
            Value::UIntPtr(v) => v as i64,
            _ => return None,
        })
    }

    /// Build an integral value of the given primitive, truncating
    pub fn from_integral(primitive: PrimitiveType, v: i64) -> Option<Value> {
        use PrimitiveType::*;
        Some(match primitive {
            Char => Value::Char(v as u16),
            SByte => Value::I8(v as i8),
            Byte => Value::U8(v as u8),
            Int16 => Value::I16(v as i16),
            UInt16 => Value::U16(v as u16),
            Int32 => Value::I32(v as i32),
            UInt32 => Value::U32(v as u32),
            Int64 => Value::I64(v),
            UInt64 => Value::U64(v as u64),
            IntPtr => Value::IntPtr(v as isize),
            UIntPtr => Value::UIntPtr(v as usize),
            Boolean | Single | Double => return None,
        })
    }

    /// The primitive this value is an instance of
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        use PrimitiveType::*;
        Some(match self {
            Value::Bool(_) => Boolean,
            Value::Char(_) => Char,
            Value::I8(_) => SByte,
            Value::U8(_) => Byte,
            Value::I16(_) => Int16,
            Value::U16(_) => UInt16,
            Value::I32(_) => Int32,
            Value::U32(_) => UInt32,
            Value::I64(_) => Int64,
            Value::U64(_) => UInt64,
            Value::F32(_) => Single,
            Value::F64(_) => Double,
            Value::IntPtr(_) => IntPtr,
            Value::UIntPtr(_) => UIntPtr,
            _ => return None,
        })
    }

    /// Zero value of a type
    pub fn zero(ty: &TypeRef) -> Value {
        match ty {
            TypeRef::Void => Value::Void,
            TypeRef::String | TypeRef::Object => Value::Null,
            TypeRef::Primitive(p) => zero_primitive(*p),
            TypeRef::Named(def) => match def.enum_underlying() {
                Some(p) => zero_primitive(p),
                None if def.is_value_type() => Value::Struct(StructValue::zeroed(def)),
                None => Value::Null,
            },
        }
    }

    /// Decode a value type from its native bytes
    ///
    /// Returns `None` for reference types or when `bytes` is too short.
    pub fn read_native(ty: &TypeRef, bytes: &[u8]) -> Option<Value> {
        if let Some(p) = ty.primitive() {
            return read_primitive(p, bytes);
        }
        match ty {
            TypeRef::Named(def) if def.is_value_type() => {
                StructValue::from_bytes(def, bytes).map(Value::Struct)
            }
            _ => None,
        }
    }

    /// Encode into native bytes; false when the value does not fit `ty`
    pub fn write_native(&self, ty: &TypeRef, out: &mut [u8]) -> bool {
        if let Some(p) = ty.primitive() {
            return write_primitive(p, self, out);
        }
        match (ty, self) {
            (TypeRef::Named(def), Value::Struct(s)) if Arc::ptr_eq(def, &s.ty) => {
                match out.get_mut(..s.bytes.len()) {
                    Some(slot) => {
                        slot.copy_from_slice(&s.bytes);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Shallow check that this value can be stored as `ty`
    ///
    /// References are only checked for being references; the heap decides
    /// whether the target object is an instance of the declared class.
    pub fn conforms_to(&self, ty: &TypeRef) -> bool {
        if let Some(p) = ty.primitive() {
            return self.primitive_type() == Some(p);
        }
        match (ty, self) {
            (TypeRef::Void, Value::Void) => true,
            (TypeRef::Named(def), Value::Struct(s)) => Arc::ptr_eq(def, &s.ty),
            (TypeRef::Named(def), Value::Null | Value::Object(_)) => !def.is_value_type(),
            (TypeRef::String | TypeRef::Object, Value::Null | Value::Object(_)) => true,
            _ => false,
        }
    }

    /// Short description for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Struct(_) => "struct",
            Value::Object(_) => "object",
            other => other.primitive_type().map_or("value", |p| p.name()),
        }
    }
}

fn zero_primitive(p: PrimitiveType) -> Value {
    match p {
        PrimitiveType::Boolean => Value::Bool(false),
        PrimitiveType::Single => Value::F32(0.0),
        PrimitiveType::Double => Value::F64(0.0),
        integral => Value::from_integral(integral, 0).unwrap_or(Value::Void),
    }
}

fn read_primitive(p: PrimitiveType, bytes: &[u8]) -> Option<Value> {
    use PrimitiveType::*;
    Some(match p {
        Boolean => Value::Bool(*bytes.first()? != 0),
        Char => Value::Char(read_ne!(u16, bytes)),
        SByte => Value::I8(read_ne!(i8, bytes)),
        Byte => Value::U8(read_ne!(u8, bytes)),
        Int16 => Value::I16(read_ne!(i16, bytes)),
        UInt16 => Value::U16(read_ne!(u16, bytes)),
        Int32 => Value::I32(read_ne!(i32, bytes)),
        UInt32 => Value::U32(read_ne!(u32, bytes)),
        Int64 => Value::I64(read_ne!(i64, bytes)),
        UInt64 => Value::U64(read_ne!(u64, bytes)),
        Single => Value::F32(read_ne!(f32, bytes)),
        Double => Value::F64(read_ne!(f64, bytes)),
        IntPtr => Value::IntPtr(read_ne!(isize, bytes)),
        UIntPtr => Value::UIntPtr(read_ne!(usize, bytes)),
    })
}

fn write_primitive(p: PrimitiveType, value: &Value, out: &mut [u8]) -> bool {
    use PrimitiveType::*;
    match (p, value) {
        (Boolean, Value::Bool(b)) => write_ne!(u8::from(*b), out),
        (Char, Value::Char(v)) => write_ne!(v, out),
        (SByte, Value::I8(v)) => write_ne!(v, out),
        (Byte, Value::U8(v)) => write_ne!(v, out),
        (Int16, Value::I16(v)) => write_ne!(v, out),
        (UInt16, Value::U16(v)) => write_ne!(v, out),
        (Int32, Value::I32(v)) => write_ne!(v, out),
        (UInt32, Value::U32(v)) => write_ne!(v, out),
        (Int64, Value::I64(v)) => write_ne!(v, out),
        (UInt64, Value::U64(v)) => write_ne!(v, out),
        (Single, Value::F32(v)) => write_ne!(v, out),
        (Double, Value::F64(v)) => write_ne!(v, out),
        (IntPtr, Value::IntPtr(v)) => write_ne!(v, out),
        (UIntPtr, Value::UIntPtr(v)) => write_ne!(v, out),
        _ => false,
    }
}

/// A value-type instance held in its native layout
#[derive(Clone)]
pub struct StructValue {
    ty: Arc<TypeDef>,
    bytes: Box<[u8]>,
}

impl StructValue {
    /// All-zero instance
    pub fn zeroed(ty: &Arc<TypeDef>) -> Self {
        Self {
            ty: ty.clone(),
            bytes: vec![0; ty.layout().size].into_boxed_slice(),
        }
    }

    /// Copy an instance out of native bytes; extra bytes are ignored
    pub fn from_bytes(ty: &Arc<TypeDef>, bytes: &[u8]) -> Option<Self> {
        let size = ty.layout().size;
        Some(Self {
            ty: ty.clone(),
            bytes: bytes.get(..size)?.into(),
        })
    }

    pub fn type_def(&self) -> &Arc<TypeDef> {
        &self.ty
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read a field by name
    pub fn get(&self, name: &str) -> Option<Value> {
        let (offset, field_ty) = self.field(name)?;
        Value::read_native(&field_ty, &self.bytes[offset..])
    }

    /// Write a field by name; false if missing or mistyped
    pub fn set(&mut self, name: &str, value: &Value) -> bool {
        match self.field(name) {
            Some((offset, field_ty)) => value.write_native(&field_ty, &mut self.bytes[offset..]),
            None => false,
        }
    }

    fn field(&self, name: &str) -> Option<(usize, TypeRef)> {
        self.ty
            .declared_fields()
            .iter()
            .filter(|f| !f.is_static() && f.name() == name)
            .find_map(|f| match f.slot() {
                crate::types::FieldSlot::Data { offset } => Some((offset, f.field_type().clone())),
                crate::types::FieldSlot::Reference { .. } => None,
            })
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty) && self.bytes == other.bytes
    }
}

impl fmt::Debug for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructValue")
            .field("type", &self.ty.full_name())
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ScopeToken;
    use crate::types::TypeBuilder;

    #[test]
    fn test_primitive_native_roundtrip() {
        let ty = TypeRef::Primitive(PrimitiveType::Int32);
        let mut bytes = [0u8; 4];
        assert!(Value::I32(-7).write_native(&ty, &mut bytes));
        assert_eq!(Value::read_native(&ty, &bytes), Some(Value::I32(-7)));
    }

    #[test]
    fn test_write_rejects_mismatch() {
        let mut bytes = [0u8; 8];
        let ty = TypeRef::Primitive(PrimitiveType::Double);
        assert!(!Value::I32(1).write_native(&ty, &mut bytes));
        assert!(!Value::F64(1.0).write_native(&ty, &mut bytes[..4]));
    }

    #[test]
    fn test_short_buffer_reads_none() {
        let ty = TypeRef::Primitive(PrimitiveType::Int64);
        assert_eq!(Value::read_native(&ty, &[0u8; 3]), None);
        assert_eq!(Value::read_native(&TypeRef::String, &[0u8; 8]), None);
    }

    #[test]
    fn test_struct_fields() {
        let scope = ScopeToken::new("test", false);
        let v3 = TypeBuilder::structure("Hive", "Vector3")
            .field("X", PrimitiveType::Single)
            .field("Y", PrimitiveType::Single)
            .field("Z", PrimitiveType::Single)
            .build(&scope)
            .unwrap();

        let mut v = StructValue::zeroed(&v3);
        assert!(v.set("Y", &Value::F32(2.5)));
        assert!(!v.set("Y", &Value::F64(2.5)));
        assert!(!v.set("W", &Value::F32(1.0)));
        assert_eq!(v.get("Y"), Some(Value::F32(2.5)));
        assert_eq!(&v.as_bytes()[4..8], &2.5f32.to_ne_bytes());

        let ty = TypeRef::Named(v3.clone());
        assert!(Value::Struct(v.clone()).conforms_to(&ty));
        assert!(!Value::Null.conforms_to(&ty));
        assert_eq!(Value::zero(&ty), Value::Struct(StructValue::zeroed(&v3)));
    }

    #[test]
    fn test_enum_values_use_underlying() {
        let scope = ScopeToken::new("test", false);
        let layer = TypeBuilder::enumeration("", "Layer", PrimitiveType::Byte)
            .variant("A", 3)
            .build(&scope)
            .unwrap();
        let ty = TypeRef::Named(layer);
        assert!(Value::U8(3).conforms_to(&ty));
        assert_eq!(Value::read_native(&ty, &[3]), Some(Value::U8(3)));
        assert_eq!(Value::zero(&ty), Value::U8(0));
    }

    #[test]
    fn test_integral_helpers() {
        assert_eq!(Value::from_integral(PrimitiveType::Int16, 70000), Some(Value::I16(4464)));
        assert_eq!(Value::from_integral(PrimitiveType::Single, 1), None);
        assert_eq!(Value::U16(9).to_i64(), Some(9));
        assert_eq!(Value::F32(1.0).to_i64(), None);
    }
}
