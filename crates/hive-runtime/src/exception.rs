//! Managed exceptions
//!
//! Exceptions raised by method bodies. They never cross the native boundary;
//! the bridge logs them and returns a sentinel.

use std::any::Any;
use std::fmt;

/// An exception raised by managed code
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedException {
    class_name: String,
    message: String,
    inner: Option<Box<ManagedException>>,
}

impl ManagedException {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            inner: None,
        }
    }

    /// `System.NullReferenceException`
    pub fn null_reference(message: impl Into<String>) -> Self {
        Self::new("System.NullReferenceException", message)
    }

    /// `System.ArgumentException`
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new("System.ArgumentException", message)
    }

    /// `System.InvalidOperationException`
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new("System.InvalidOperationException", message)
    }

    /// Convert a panic payload caught while running managed code
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "managed code panicked".to_string()
        };
        Self::new("System.Exception", message)
    }

    /// Wrap `inner` the way reflective invocation reports it
    pub fn target_invocation(inner: ManagedException) -> Self {
        Self {
            class_name: "System.Reflection.TargetInvocationException".to_string(),
            message: "Exception has been thrown by the target of an invocation.".to_string(),
            inner: Some(Box::new(inner)),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn inner(&self) -> Option<&ManagedException> {
        self.inner.as_deref()
    }

    /// The innermost exception in the chain
    pub fn root_cause(&self) -> &ManagedException {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }
}

impl fmt::Display for ManagedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

impl std::error::Error for ManagedException {}
