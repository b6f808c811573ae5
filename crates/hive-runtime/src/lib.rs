//! Hive managed runtime
//!
//! The object model the bridge drives: types and their native layouts,
//! assemblies built from registered images, a generation-checked object heap,
//! GC handles, and a mark-sweep collector with finalization.
//!
//! Nothing in this crate knows about the native boundary. The bridge crate
//! turns these types into ID tables, raw pointers and sentinel returns.

pub mod assembly;
pub mod exception;
pub mod frame;
pub mod gc;
pub mod loader;
pub mod object;
pub mod types;
pub mod value;

pub use assembly::{Assembly, AssemblyBuilder, ScopeToken};
pub use exception::ManagedException;
pub use frame::{construct_object, run_guarded, CallFrame};
pub use gc::{GarbageCollector, GcHandle, GcHandleKind, GcHandleTable, GcStats, Heap, ObjectRef};
pub use loader::{AssemblyManifest, ImageRegistry, LoadError, LoadScope};
pub use object::HeapObject;
pub use types::{
    BindingFlags, FieldDef, MethodBuilder, MethodDef, PrimitiveType, TypeBuilder, TypeDef,
    TypeRef, Visibility,
};
pub use value::{StructValue, Value};

/// Runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Two types with the same full name in one assembly
    #[error("Type {0} is already defined")]
    DuplicateType(String),

    /// A type an image depends on is not visible
    #[error("Type {0} could not be resolved")]
    MissingType(String),

    #[error("Invalid base type for {ty}: {reason}")]
    InvalidBase { ty: String, reason: String },

    #[error("Invalid field {ty}.{field}: {reason}")]
    InvalidField {
        ty: String,
        field: String,
        reason: String,
    },

    #[error("Ambiguous match for {ty}.{member}")]
    AmbiguousMatch { ty: String, member: String },

    /// Reference to a freed object
    #[error("Object reference is stale")]
    StaleReference,

    #[error("Object of type {0} is not a class instance")]
    NotAnInstance(String),

    #[error("Field {0} requires an instance")]
    InstanceRequired(String),

    #[error("Field {field} is not declared on {ty}")]
    FieldOwnerMismatch { field: String, ty: String },

    #[error("Field {0} is read-only")]
    ReadOnlyField(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The declaring type was dropped with its context
    #[error("Declaring type has been unloaded")]
    TypeUnloaded,

    #[error("Type {0} is not a class")]
    NotAClass(String),

    #[error("Type {0} is abstract")]
    AbstractType(String),

    #[error("Type {0} has no default constructor")]
    NoDefaultConstructor(String),

    /// Raised by managed code
    #[error(transparent)]
    Exception(#[from] ManagedException),
}

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl From<RuntimeError> for ManagedException {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Exception(e) => e,
            RuntimeError::StaleReference | RuntimeError::InstanceRequired(_) => {
                ManagedException::null_reference(error.to_string())
            }
            RuntimeError::TypeMismatch { .. } | RuntimeError::NotAnInstance(_) => {
                ManagedException::new("System.InvalidCastException", error.to_string())
            }
            RuntimeError::FieldOwnerMismatch { .. } => ManagedException::argument(error.to_string()),
            RuntimeError::NoDefaultConstructor(_) => {
                ManagedException::new("System.MissingMethodException", error.to_string())
            }
            other => ManagedException::invalid_operation(other.to_string()),
        }
    }
}
