//! Object-layout contract: byte offsets and bit-field positions emitted
//! code depends on. The object model itself is external; these constants
//! are the agreed shape of the memory the trampolines poke at.

/// Offsets within a heap object header.
pub mod object {
    /// The hclass pointer is the first word of every heap object.
    pub const HCLASS_OFFSET: i32 = 0;
}

/// Offsets and bit positions within an hclass.
pub mod hclass {
    /// Packed bit-field word.
    pub const BIT_FIELD_OFFSET: i32 = 8;
    /// Object type byte inside the bit field (low byte).
    pub const TYPE_MASK: u64 = 0xFF;
    /// Callable flag inside the bit field.
    pub const CALLABLE_BIT: u32 = 8;

    /// Type-byte values the call classifier distinguishes. Only the
    /// function range and the two special callables matter here.
    pub const JS_FUNCTION_FIRST: u8 = 0x10;
    pub const JS_FUNCTION_LAST: u8 = 0x1F;
    pub const JS_BOUND_FUNCTION: u8 = 0x25;
    pub const JS_PROXY: u8 = 0x28;
}

/// Offsets within a function object.
pub mod function {
    pub const METHOD_OFFSET: i32 = 32;
    pub const CODE_ENTRY_OFFSET: i32 = 40;
    pub const LEXICAL_ENV_OFFSET: i32 = 48;
}

/// Offsets within a bound-function object.
pub mod bound_function {
    pub const BOUND_TARGET_OFFSET: i32 = 32;
    pub const BOUND_THIS_OFFSET: i32 = 40;
    pub const BOUND_ARGUMENTS_OFFSET: i32 = 48;
}

/// Offsets within a tagged array (used for bound-argument lists).
pub mod tagged_array {
    pub const LENGTH_OFFSET: i32 = 8;
    pub const DATA_OFFSET: i32 = 16;
}

/// The method call field: one 64-bit word packing the calling contract of
/// a function's bytecode.
pub mod method {
    pub const CALL_FIELD_OFFSET: i32 = 24;
    pub const BYTECODE_ARRAY_OFFSET: i32 = 32;

    pub const HAVE_THIS_BIT: u32 = 0;
    pub const HAVE_NEW_TARGET_BIT: u32 = 1;
    pub const HAVE_EXTRA_BIT: u32 = 2;
    pub const HAVE_FUNC_BIT: u32 = 3;
    pub const NUM_VREGS_SHIFT: u32 = 4;
    pub const NUM_VREGS_BITS: u32 = 28;
    pub const NUM_ARGS_SHIFT: u32 = 32;
    pub const NUM_ARGS_BITS: u32 = 28;
    pub const IS_NATIVE_BIT: u32 = 60;
    pub const IS_AOT_CODE_BIT: u32 = 61;

    pub fn have_this(call_field: u64) -> bool {
        (call_field >> HAVE_THIS_BIT) & 1 != 0
    }

    pub fn have_new_target(call_field: u64) -> bool {
        (call_field >> HAVE_NEW_TARGET_BIT) & 1 != 0
    }

    pub fn have_extra(call_field: u64) -> bool {
        (call_field >> HAVE_EXTRA_BIT) & 1 != 0
    }

    pub fn have_func(call_field: u64) -> bool {
        (call_field >> HAVE_FUNC_BIT) & 1 != 0
    }

    pub fn num_vregs(call_field: u64) -> u32 {
        ((call_field >> NUM_VREGS_SHIFT) & ((1 << NUM_VREGS_BITS) - 1)) as u32
    }

    pub fn num_args(call_field: u64) -> u32 {
        ((call_field >> NUM_ARGS_SHIFT) & ((1 << NUM_ARGS_BITS) - 1)) as u32
    }

    pub fn is_native(call_field: u64) -> bool {
        (call_field >> IS_NATIVE_BIT) & 1 != 0
    }

    pub fn is_aot_code(call_field: u64) -> bool {
        (call_field >> IS_AOT_CODE_BIT) & 1 != 0
    }

    /// Pack a call field from its parts.
    pub fn pack(
        num_vregs: u32,
        num_args: u32,
        have_this: bool,
        have_new_target: bool,
        have_extra: bool,
        have_func: bool,
        native: bool,
        aot: bool,
    ) -> u64 {
        assert!(num_vregs < (1 << NUM_VREGS_BITS));
        assert!(num_args < (1 << NUM_ARGS_BITS));
        (have_this as u64) << HAVE_THIS_BIT
            | (have_new_target as u64) << HAVE_NEW_TARGET_BIT
            | (have_extra as u64) << HAVE_EXTRA_BIT
            | (have_func as u64) << HAVE_FUNC_BIT
            | (num_vregs as u64) << NUM_VREGS_SHIFT
            | (num_args as u64) << NUM_ARGS_SHIFT
            | (native as u64) << IS_NATIVE_BIT
            | (aot as u64) << IS_AOT_CODE_BIT
    }
}
