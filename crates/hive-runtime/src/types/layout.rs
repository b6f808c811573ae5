//! Native layouts
//!
//! Value types and class instance data use sequential C layout: fields in
//! declaration order, each at its natural alignment, with the total size
//! padded to the largest alignment.

use super::PrimitiveType;

/// Size and alignment of a native block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeLayout {
    /// Size in bytes, including trailing padding
    pub size: usize,

    /// Alignment in bytes (power of two)
    pub align: usize,
}

impl NativeLayout {
    /// Layout of a block with no fields
    pub const EMPTY: NativeLayout = NativeLayout { size: 0, align: 1 };

    /// Layout of a primitive
    pub fn of_primitive(primitive: PrimitiveType) -> Self {
        Self {
            size: primitive.size(),
            align: primitive.align(),
        }
    }
}

impl Default for NativeLayout {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Incremental sequential layout computation
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    size: usize,
    align: usize,
}

impl LayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self { size: 0, align: 1 }
    }

    /// Continue after an existing layout (base class data)
    pub fn extend(base: NativeLayout) -> Self {
        Self {
            size: base.size,
            align: base.align.max(1),
        }
    }

    /// Append a field and return its offset
    pub fn push(&mut self, field: NativeLayout) -> usize {
        let offset = align_up(self.size, field.align);
        self.size = offset + field.size;
        self.align = self.align.max(field.align);
        offset
    }

    /// Finish a reference-type data block
    pub fn finish(self) -> NativeLayout {
        NativeLayout {
            size: align_up(self.size, self.align),
            align: self.align,
        }
    }

    /// Finish a value-type layout; an empty struct still occupies one byte
    pub fn finish_value_type(self) -> NativeLayout {
        let layout = self.finish();
        NativeLayout {
            size: layout.size.max(1),
            align: layout.align,
        }
    }
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Zero-initialised byte block aligned to 8 bytes
///
/// Instance data is handed to native code through pinned handles, so every
/// primitive inside must sit at its natural alignment in real memory.
#[derive(Clone)]
pub struct AlignedBytes {
    words: Box<[u64]>,
    len: usize,
}

impl AlignedBytes {
    /// Allocate `len` zeroed bytes
    pub fn zeroed(len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        Self { words, len }
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View as bytes
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the word buffer holds at least `len` initialised bytes and
        // u8 has no alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }

    /// View as mutable bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see `as_slice`; the borrow is unique.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, self.len) }
    }

    /// Stable address of the first byte
    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr() as *const u8
    }
}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBytes").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(p: PrimitiveType) -> NativeLayout {
        NativeLayout::of_primitive(p)
    }

    #[test]
    fn test_vector3_layout() {
        let mut b = LayoutBuilder::new();
        assert_eq!(b.push(prim(PrimitiveType::Single)), 0);
        assert_eq!(b.push(prim(PrimitiveType::Single)), 4);
        assert_eq!(b.push(prim(PrimitiveType::Single)), 8);
        assert_eq!(b.finish_value_type(), NativeLayout { size: 12, align: 4 });
    }

    #[test]
    fn test_padding() {
        let mut b = LayoutBuilder::new();
        assert_eq!(b.push(prim(PrimitiveType::Byte)), 0);
        assert_eq!(b.push(prim(PrimitiveType::Int32)), 4);
        assert_eq!(b.finish().size, 8);

        let mut b = LayoutBuilder::new();
        b.push(prim(PrimitiveType::Int64));
        b.push(prim(PrimitiveType::Byte));
        assert_eq!(b.finish(), NativeLayout { size: 16, align: 8 });
    }

    #[test]
    fn test_empty_struct_is_one_byte() {
        assert_eq!(LayoutBuilder::new().finish_value_type().size, 1);
        assert_eq!(LayoutBuilder::new().finish().size, 0);
    }

    #[test]
    fn test_extend_base() {
        let base = NativeLayout { size: 8, align: 8 };
        let mut b = LayoutBuilder::extend(base);
        assert_eq!(b.push(prim(PrimitiveType::Int16)), 8);
        assert_eq!(b.finish().size, 16);
    }

    #[test]
    fn test_aligned_bytes() {
        let mut bytes = AlignedBytes::zeroed(12);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes.as_ptr() as usize % 8, 0);
        bytes.as_mut_slice()[11] = 7;
        assert_eq!(bytes.as_slice()[11], 7);
        assert!(AlignedBytes::zeroed(0).is_empty());
    }
}
