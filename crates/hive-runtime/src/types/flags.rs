//! Member attributes and lookup flags

use bitflags::bitflags;

bitflags! {
    /// Member lookup filter; numeric values are shared with native hosts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingFlags: u32 {
        /// Case-insensitive name matching
        const IGNORE_CASE = 0x01;
        /// Only members declared on the type itself
        const DECLARED_ONLY = 0x02;
        /// Instance members
        const INSTANCE = 0x04;
        /// Static members
        const STATIC = 0x08;
        /// Public members
        const PUBLIC = 0x10;
        /// Non-public members
        const NON_PUBLIC = 0x20;
        /// Inherited static members
        const FLATTEN_HIERARCHY = 0x40;
    }
}

impl BindingFlags {
    /// Filter used when a caller asks for members without flags
    pub const DEFAULT_LOOKUP: BindingFlags = BindingFlags::PUBLIC
        .union(BindingFlags::INSTANCE)
        .union(BindingFlags::STATIC);

    /// Every member declared on the type or inherited from it
    pub const ALL: BindingFlags = BindingFlags::DEFAULT_LOOKUP
        .union(BindingFlags::NON_PUBLIC)
        .union(BindingFlags::FLATTEN_HIERARCHY);

    /// Whether a member with these properties passes the filter
    pub fn admits(self, visibility: Visibility, is_static: bool, inherited: bool) -> bool {
        if inherited {
            if self.contains(BindingFlags::DECLARED_ONLY) || visibility == Visibility::Private {
                return false;
            }
            if is_static && !self.contains(BindingFlags::FLATTEN_HIERARCHY) {
                return false;
            }
        }

        let access = if visibility == Visibility::Public {
            self.contains(BindingFlags::PUBLIC)
        } else {
            self.contains(BindingFlags::NON_PUBLIC)
        };
        let storage = if is_static {
            self.contains(BindingFlags::STATIC)
        } else {
            self.contains(BindingFlags::INSTANCE)
        };
        access && storage
    }

    /// Compare a member name under this filter
    pub fn name_matches(self, candidate: &str, wanted: &str) -> bool {
        if self.contains(BindingFlags::IGNORE_CASE) {
            candidate.eq_ignore_ascii_case(wanted)
        } else {
            candidate == wanted
        }
    }
}

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Visibility {
    Private = 1,
    PrivateProtected = 2,
    Internal = 3,
    Protected = 4,
    ProtectedInternal = 5,
    Public = 6,
}

bitflags! {
    /// Type-level attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Visible outside its assembly
        const PUBLIC = 0x01;
        /// Cannot be instantiated
        const ABSTRACT = 0x02;
        /// Cannot be derived from
        const SEALED = 0x04;
    }
}

bitflags! {
    /// Field attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAttributes: u32 {
        /// Stored once per type rather than per instance
        const STATIC = 0x01;
        /// Assignable only by the constructor
        const INIT_ONLY = 0x02;
        /// Compile-time constant
        const LITERAL = 0x04;
    }
}

bitflags! {
    /// Method attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAttributes: u32 {
        /// Called without an instance
        const STATIC = 0x01;
        /// Dispatched on the runtime type of the instance
        const VIRTUAL = 0x02;
        /// Has a native entry point callable directly from native code
        const NATIVE_CALLABLE = 0x04;
    }
}
