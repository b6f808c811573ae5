//! Type system
//!
//! Types are built once per load scope and shared through `Arc`. Identity is
//! pointer identity: two contexts loading the same image get distinct types.

mod builder;
mod def;
mod flags;
mod layout;
mod primitive;
mod type_ref;

pub use builder::{MethodBuilder, TypeBuilder};
pub use def::{
    FieldDef, FieldSlot, MethodBody, MethodDef, NativeEntryPoint, ParamDef, StaticStorage,
    TypeDef, TypeKind,
};
pub use flags::{BindingFlags, FieldAttributes, MethodAttributes, TypeAttributes, Visibility};
pub use layout::{AlignedBytes, LayoutBuilder, NativeLayout};
pub use primitive::PrimitiveType;
pub use type_ref::TypeRef;
