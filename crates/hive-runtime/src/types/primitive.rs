//! Primitive value types
//!
//! Primitives have a fixed native size and alignment that both sides of the
//! boundary agree on.

/// Built-in value types with a fixed native representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// One-byte boolean
    Boolean,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    SByte,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 16-bit integer
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// Pointer-sized signed integer
    IntPtr,
    /// Pointer-sized unsigned integer
    UIntPtr,
}

impl PrimitiveType {
    /// Size in bytes of the native representation
    pub fn size(self) -> usize {
        use PrimitiveType::*;
        match self {
            Boolean | SByte | Byte => 1,
            Char | Int16 | UInt16 => 2,
            Int32 | UInt32 | Single => 4,
            Int64 | UInt64 | Double => 8,
            IntPtr | UIntPtr => std::mem::size_of::<usize>(),
        }
    }

    /// Natural alignment; primitives are aligned to their size
    pub fn align(self) -> usize {
        self.size()
    }

    /// Whether this primitive may back an enum
    pub fn is_integral(self) -> bool {
        !matches!(
            self,
            PrimitiveType::Boolean | PrimitiveType::Single | PrimitiveType::Double
        )
    }

    /// Short runtime name (`Int32`)
    pub fn name(self) -> &'static str {
        self.full_name().trim_start_matches("System.")
    }

    /// Namespace-qualified runtime name (`System.Int32`)
    pub fn full_name(self) -> &'static str {
        use PrimitiveType::*;
        match self {
            Boolean => "System.Boolean",
            Char => "System.Char",
            SByte => "System.SByte",
            Byte => "System.Byte",
            Int16 => "System.Int16",
            UInt16 => "System.UInt16",
            Int32 => "System.Int32",
            UInt32 => "System.UInt32",
            Int64 => "System.Int64",
            UInt64 => "System.UInt64",
            Single => "System.Single",
            Double => "System.Double",
            IntPtr => "System.IntPtr",
            UIntPtr => "System.UIntPtr",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(PrimitiveType::Boolean.size(), 1);
        assert_eq!(PrimitiveType::Char.size(), 2);
        assert_eq!(PrimitiveType::Single.size(), 4);
        assert_eq!(PrimitiveType::Double.align(), 8);
        assert_eq!(PrimitiveType::IntPtr.size(), std::mem::size_of::<usize>());
    }

    #[test]
    fn test_names() {
        assert_eq!(PrimitiveType::Int32.name(), "Int32");
        assert_eq!(PrimitiveType::Single.full_name(), "System.Single");
    }

    #[test]
    fn test_integral() {
        assert!(PrimitiveType::Byte.is_integral());
        assert!(!PrimitiveType::Double.is_integral());
        assert!(!PrimitiveType::Boolean.is_integral());
    }
}
