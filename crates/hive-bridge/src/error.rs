//! Bridge errors
//!
//! Every failure at the boundary falls into one of three categories. Lookups
//! that walk the context → assembly → type → member chain fail with
//! resolution errors; operations the target cannot perform fail with
//! capability errors; exceptions thrown by managed code are user-code errors.
//! Unload that cannot finish is not an error and is reported through
//! [`UnloadState::Incomplete`](crate::UnloadState::Incomplete).

use crate::ids::{AssemblyId, ClassId, ContextId, FieldId, MethodId};
use hive_runtime::gc::HandleError;
use hive_runtime::{LoadError, ManagedException, RuntimeError};
use thiserror::Error;

/// Errors raised by bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Context ID {0} is invalid")]
    InvalidContext(ContextId),

    #[error("Assembly ID {0} is invalid")]
    InvalidAssembly(AssemblyId),

    #[error("Class ID {0} is invalid")]
    InvalidClass(ClassId),

    #[error("Method ID {0} is invalid")]
    InvalidMethod(MethodId),

    #[error("Field ID {0} is invalid")]
    InvalidField(FieldId),

    /// Resolution failure of the derived chain in a subclass check
    #[error("Derived {0}")]
    Derived(Box<BridgeError>),

    /// Resolution failure of the base chain in a subclass check
    #[error("Base {0}")]
    Base(Box<BridgeError>),

    #[error("Argument '{0}' is null")]
    NullArgument(&'static str),

    #[error("Argument '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("Unable to find method {name} with the given binding flags")]
    MethodNotFound { name: String },

    #[error("Ambiguous match for method {name}")]
    AmbiguousMethod { name: String },

    #[error("Method {method} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid GC handle kind {0}")]
    InvalidHandleKind(i32),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error("Bridge call issued while another call is running on this thread")]
    Reentrant,

    #[error("Context {0} was not created as unloadable")]
    NotUnloadable(ContextId),

    #[error("Assembly {name} is already loaded in context {context}")]
    DuplicateAssembly { name: String, context: ContextId },

    #[error("Method {0} has no native entry point")]
    NotNativeCallable(String),

    #[error("Method {0} has no managed body")]
    MissingBody(String),

    #[error("Instance method {0} requires an instance")]
    InstanceRequired(String),

    #[error("Type {0} cannot be marshaled by value")]
    NotMarshalable(String),

    #[error("Unmanaged allocation of {0} bytes failed")]
    OutOfMemory(usize),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(RuntimeError),

    /// Exception thrown by managed code, wrapped as a target invocation
    #[error("{}", .0.root_cause())]
    UserException(ManagedException),
}

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Broad failure class of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad ID, bad handle or bad argument from the host
    Resolution,
    /// The target exists but cannot do what was asked
    Capability,
    /// Managed code threw
    UserCode,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidContext(_)
            | BridgeError::InvalidAssembly(_)
            | BridgeError::InvalidClass(_)
            | BridgeError::InvalidMethod(_)
            | BridgeError::InvalidField(_)
            | BridgeError::Derived(_)
            | BridgeError::Base(_)
            | BridgeError::NullArgument(_)
            | BridgeError::InvalidUtf8(_)
            | BridgeError::MethodNotFound { .. }
            | BridgeError::AmbiguousMethod { .. }
            | BridgeError::ArgumentCount { .. }
            | BridgeError::InvalidHandleKind(_)
            | BridgeError::Handle(_)
            | BridgeError::Reentrant
            | BridgeError::Load(_) => ErrorCategory::Resolution,

            BridgeError::Runtime(e) => match e {
                RuntimeError::NotAClass(_)
                | RuntimeError::AbstractType(_)
                | RuntimeError::NoDefaultConstructor(_)
                | RuntimeError::ReadOnlyField(_)
                | RuntimeError::TypeUnloaded => ErrorCategory::Capability,
                _ => ErrorCategory::Resolution,
            },

            BridgeError::NotUnloadable(_)
            | BridgeError::DuplicateAssembly { .. }
            | BridgeError::NotNativeCallable(_)
            | BridgeError::MissingBody(_)
            | BridgeError::InstanceRequired(_)
            | BridgeError::NotMarshalable(_)
            | BridgeError::OutOfMemory(_) => ErrorCategory::Capability,

            BridgeError::UserException(_) => ErrorCategory::UserCode,
        }
    }

    /// The managed exception, for user-code failures
    pub fn exception(&self) -> Option<&ManagedException> {
        match self {
            BridgeError::UserException(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RuntimeError> for BridgeError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Exception(e) => BridgeError::UserException(ManagedException::target_invocation(e)),
            other => BridgeError::Runtime(other),
        }
    }
}

impl From<ManagedException> for BridgeError {
    fn from(error: ManagedException) -> Self {
        BridgeError::UserException(ManagedException::target_invocation(error))
    }
}

/// Log a failed boundary operation
///
/// Produces the single log line that accompanies every sentinel return.
pub(crate) fn log_failure(action: &str, error: &BridgeError) {
    match error.exception() {
        Some(e) => tracing::error!(
            exception = e.root_cause().class_name(),
            "{}. Message: {}",
            action,
            e.root_cause().message()
        ),
        None => tracing::error!("{}. Message: {}", action, error),
    }
}
