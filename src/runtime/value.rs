//! NaN-boxed 64-bit value representation.
//!
//! Integers carry the full-ones tag in the top 16 bits, doubles are offset
//! by 2^48 so their tag range never collides with pointers, and heap
//! pointers have an all-zero tag. A handful of special non-pointer values
//! (undefined, null, hole, booleans, the exception sentinel) live in the
//! low byte of the pointer space.

/// A boxed runtime value. Plain bit container; the predicates below are
/// the only interpretation this layer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedValue(pub u64);

impl TaggedValue {
    pub const TAG_BITS_SIZE: u32 = 16;
    pub const TAG_BITS_SHIFT: u32 = 64 - Self::TAG_BITS_SIZE;
    pub const TAG_MASK: u64 = ((1u64 << Self::TAG_BITS_SIZE) - 1) << Self::TAG_BITS_SHIFT;
    pub const TAG_INT: u64 = 0xFFFFu64 << Self::TAG_BITS_SHIFT;
    pub const TAG_OBJECT: u64 = 0x0000u64 << Self::TAG_BITS_SHIFT;

    pub const TAG_SPECIAL_MASK: u64 = 0xFF;
    pub const TAG_SPECIAL_VALUE: u64 = 0x02;
    pub const TAG_BOOLEAN: u64 = 0x04;
    pub const TAG_UNDEFINED: u64 = 0x08;
    pub const TAG_EXCEPTION: u64 = 0x10;
    pub const TAG_WEAK_MASK: u64 = Self::TAG_OBJECT | 0x01;
    pub const TAG_WEAK_FILTER: u64 = 0x03;

    pub const VALUE_HOLE: u64 = Self::TAG_OBJECT;
    pub const VALUE_NULL: u64 = Self::TAG_OBJECT | Self::TAG_SPECIAL_VALUE;
    pub const VALUE_FALSE: u64 = Self::TAG_OBJECT | Self::TAG_BOOLEAN | Self::TAG_SPECIAL_VALUE;
    pub const VALUE_TRUE: u64 =
        Self::TAG_OBJECT | Self::TAG_BOOLEAN | Self::TAG_SPECIAL_VALUE | 1;
    pub const VALUE_ZERO: u64 = Self::TAG_INT;
    pub const VALUE_UNDEFINED: u64 =
        Self::TAG_OBJECT | Self::TAG_SPECIAL_VALUE | Self::TAG_UNDEFINED;
    pub const VALUE_EXCEPTION: u64 =
        Self::TAG_OBJECT | Self::TAG_SPECIAL_VALUE | Self::TAG_EXCEPTION;

    pub const DOUBLE_ENCODE_OFFSET_BIT: u32 = 48;
    pub const DOUBLE_ENCODE_OFFSET: u64 = 1u64 << Self::DOUBLE_ENCODE_OFFSET_BIT;

    pub const fn undefined() -> Self {
        Self(Self::VALUE_UNDEFINED)
    }

    pub const fn null() -> Self {
        Self(Self::VALUE_NULL)
    }

    pub const fn hole() -> Self {
        Self(Self::VALUE_HOLE)
    }

    /// The failure sentinel threaded through return channels in place of
    /// native unwinding.
    pub const fn exception() -> Self {
        Self(Self::VALUE_EXCEPTION)
    }

    pub const fn from_int(v: i32) -> Self {
        Self((v as u32 as u64) | Self::TAG_INT)
    }

    pub fn from_double(v: f64) -> Self {
        Self(v.to_bits().wrapping_add(Self::DOUBLE_ENCODE_OFFSET))
    }

    pub const fn from_bool(v: bool) -> Self {
        if v {
            Self(Self::VALUE_TRUE)
        } else {
            Self(Self::VALUE_FALSE)
        }
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_int(self) -> bool {
        (self.0 & Self::TAG_MASK) == Self::TAG_INT
    }

    pub const fn is_double(self) -> bool {
        !self.is_int() && !self.is_object()
    }

    pub const fn is_object(self) -> bool {
        (self.0 & Self::TAG_MASK) == Self::TAG_OBJECT
    }

    /// An object-tagged value that is not one of the special non-pointer
    /// encodings.
    pub const fn is_heap_object(self) -> bool {
        self.is_object() && !self.is_special()
    }

    pub const fn is_undefined(self) -> bool {
        self.0 == Self::VALUE_UNDEFINED
    }

    pub const fn is_null(self) -> bool {
        self.0 == Self::VALUE_NULL
    }

    pub const fn is_hole(self) -> bool {
        self.0 == Self::VALUE_HOLE
    }

    pub const fn is_exception(self) -> bool {
        self.0 == Self::VALUE_EXCEPTION
    }

    pub const fn is_boolean(self) -> bool {
        self.0 == Self::VALUE_TRUE || self.0 == Self::VALUE_FALSE
    }

    /// One of the low-byte special encodings (hole, null, undefined,
    /// booleans, exception).
    pub const fn is_special(self) -> bool {
        self.is_object() && (self.0 <= Self::TAG_SPECIAL_MASK)
    }

    pub const fn is_weak(self) -> bool {
        self.is_object() && !self.is_special() && (self.0 & Self::TAG_WEAK_MASK) == 1
    }

    pub fn as_int(self) -> i32 {
        debug_assert!(self.is_int());
        self.0 as u32 as i32
    }

    pub fn as_double(self) -> f64 {
        debug_assert!(self.is_double());
        f64::from_bits(self.0.wrapping_sub(Self::DOUBLE_ENCODE_OFFSET))
    }
}
