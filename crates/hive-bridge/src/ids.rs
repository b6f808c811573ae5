//! Bridge IDs
//!
//! Every ID comes from one counter starting at 1; 0 is the failure sentinel.
//! IDs are not namespaced: the same number may name a context, an assembly in
//! one context and a type in another, so lookups always walk the full chain.

use std::fmt;

/// Sentinel value meaning "no ID"
pub const INVALID_ID: u64 = 0;

/// Issues monotonically increasing IDs
#[derive(Debug)]
pub struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Next unused ID
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of IDs issued so far
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversion between typed IDs and their raw value
pub trait RawId: Copy {
    fn from_raw(raw: u64) -> Self;
    fn as_u64(&self) -> u64;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl RawId for $name {
            fn from_raw(raw: u64) -> Self {
                $name(raw)
            }

            fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl $name {
            /// Get the raw ID value
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Load context ID
    ContextId
);
define_id!(
    /// Assembly ID, valid under its context
    AssemblyId
);
define_id!(
    /// Type ID, valid under its assembly
    ClassId
);
define_id!(
    /// Method ID, valid under its type
    MethodId
);
define_id!(
    /// Field ID, valid under its type
    FieldId
);
