//! Bit counting and mask-shape helpers used by the instruction encoders.
//!
//! All functions take an explicit register width (32 or 64) so the same
//! helper serves both operand sizes. A zero input counts as `width` zeros,
//! which is what the bitmask-immediate search relies on.

/// Count leading zeros of `value` within the low `width` bits.
pub fn count_leading_zeros(value: u64, width: u32) -> u32 {
    debug_assert!(width == 32 || width == 64);
    if value == 0 {
        return width;
    }
    value.leading_zeros() - (64 - width)
}

/// Count trailing zeros of `value` within the low `width` bits.
pub fn count_trailing_zeros(value: u64, width: u32) -> u32 {
    debug_assert!(width == 32 || width == 64);
    if value == 0 {
        return width;
    }
    value.trailing_zeros().min(width)
}

/// Count leading ones of `value` within the low `width` bits.
pub fn count_leading_ones(value: u64, width: u32) -> u32 {
    let masked = if width >= 64 { !value } else { !value & ((1u64 << width) - 1) };
    count_leading_zeros(masked, width)
}

/// Count trailing ones of `value` within the low `width` bits.
pub fn count_trailing_ones(value: u64, width: u32) -> u32 {
    let masked = if width >= 64 { !value } else { !value & ((1u64 << width) - 1) };
    count_trailing_zeros(masked, width)
}

/// A contiguous run of ones starting at bit 0 (e.g. 0x0000FFFF).
pub fn is_mask(value: u64) -> bool {
    value != 0 && (value.wrapping_add(1) & value) == 0
}

/// A contiguous run of ones anywhere (e.g. 0x00FF0000).
pub fn is_shifted_mask(value: u64) -> bool {
    value != 0 && is_mask((value - 1) | value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_zeros_zero_input() {
        assert_eq!(count_leading_zeros(0, 64), 64);
        assert_eq!(count_leading_zeros(0, 32), 32);
        assert_eq!(count_trailing_zeros(0, 64), 64);
        assert_eq!(count_trailing_zeros(0, 32), 32);
    }

    #[test]
    fn test_count_leading_zeros() {
        assert_eq!(count_leading_zeros(1, 64), 63);
        assert_eq!(count_leading_zeros(1 << 63, 64), 0);
        assert_eq!(count_leading_zeros(0x0000_0001, 32), 31);
        assert_eq!(count_leading_zeros(0x8000_0000, 32), 0);
    }

    #[test]
    fn test_count_trailing_zeros() {
        assert_eq!(count_trailing_zeros(8, 64), 3);
        assert_eq!(count_trailing_zeros(1 << 63, 64), 63);
        assert_eq!(count_trailing_zeros(0x10, 32), 4);
    }

    #[test]
    fn test_count_ones() {
        assert_eq!(count_trailing_ones(0xFF, 64), 8);
        assert_eq!(count_trailing_ones(0, 64), 0);
        assert_eq!(count_trailing_ones(u64::MAX, 64), 64);
        assert_eq!(count_leading_ones(0xFFFF_0000_0000_0000, 64), 16);
        assert_eq!(count_leading_ones(0xFFFF_0000, 32), 16);
    }

    #[test]
    fn test_is_mask() {
        assert!(is_mask(0x1));
        assert!(is_mask(0xFF));
        assert!(is_mask(u64::MAX));
        assert!(!is_mask(0));
        assert!(!is_mask(0xFF00));
        assert!(!is_mask(0b1011));
    }

    #[test]
    fn test_is_shifted_mask() {
        assert!(is_shifted_mask(0xFF00));
        assert!(is_shifted_mask(0x1));
        assert!(is_shifted_mask(0x00FF_0000));
        assert!(is_shifted_mask(u64::MAX));
        assert!(!is_shifted_mask(0));
        assert!(!is_shifted_mask(0b101));
        assert!(!is_shifted_mask(0xFF00_FF00));
    }
}
