//! Bit-range extraction helpers.
//!
//! Every multi-bit field decode in the engine goes through these. Ranges are
//! inclusive-exclusive `[low, high)` and zero-extended. Out-of-range arguments
//! are a programmer error: they trip a debug assertion, and in release builds
//! the shift/mask is still performed safely (no UB, no wrapping shift).

/// Extract bits `[low, high)` from a 32-bit word, zero-extended.
#[inline]
pub fn extract32(value: u32, low: u8, high: u8) -> u32 {
    debug_assert!(low < high && high <= 32, "bit range [{low}, {high}) out of range for u32");
    if low >= 32 || low >= high {
        return 0;
    }
    let shifted = value >> low;
    let width = high.min(32) - low;
    if width >= 32 {
        shifted
    } else {
        shifted & ((1u32 << width) - 1)
    }
}

/// Extract bits `[low, high)` from a 64-bit word, zero-extended.
#[inline]
pub fn extract64(value: u64, low: u8, high: u8) -> u64 {
    debug_assert!(low < high && high <= 64, "bit range [{low}, {high}) out of range for u64");
    if low >= 64 || low >= high {
        return 0;
    }
    let shifted = value >> low;
    let width = high.min(64) - low;
    if width >= 64 {
        shifted
    } else {
        shifted & ((1u64 << width) - 1)
    }
}

/// Test a single bit.
#[inline]
pub fn bit32(value: u32, bit: u8) -> bool {
    debug_assert!(bit < 32);
    bit < 32 && (value >> bit) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract32_nibble() {
        assert_eq!(extract32(0b1011_0110, 4, 8), 0b1011);
    }

    #[test]
    fn test_extract32_low_bits() {
        assert_eq!(extract32(0b1011_0110, 0, 4), 0b0110);
    }

    #[test]
    fn test_extract32_full_width() {
        assert_eq!(extract32(0xDEAD_BEEF, 0, 32), 0xDEAD_BEEF);
    }

    #[test]
    fn test_extract32_single_bit() {
        assert_eq!(extract32(0b100, 2, 3), 1);
        assert_eq!(extract32(0b100, 1, 2), 0);
    }

    #[test]
    fn test_extract32_high_field() {
        // family_ext lives in bits [20, 28)
        assert_eq!(extract32(0x0F70_0000, 20, 28), 0xF7);
    }

    #[test]
    fn test_extract64() {
        assert_eq!(extract64(0xFFFF_0000_0000_0000, 48, 64), 0xFFFF);
        assert_eq!(extract64(u64::MAX, 0, 64), u64::MAX);
    }

    #[test]
    fn test_bit32() {
        assert!(bit32(1 << 20, 20));
        assert!(!bit32(1 << 20, 21));
    }
}
