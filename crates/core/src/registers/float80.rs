//! x87 80-bit extended-precision values.
//!
//! Rust has no native 80-bit float, so the raw encoding is kept as-is
//! (64-bit significand with explicit integer bit, 15-bit exponent, sign) and
//! converted to `f64` on demand.

use std::fmt;

/// Exponent bias of the extended format.
const EXPONENT_BIAS: i32 = 16383;

/// All-ones exponent marking infinities and NaNs.
const EXPONENT_SPECIAL: u16 = 0x7fff;

/// Explicit integer bit of the significand.
const INTEGER_BIT: u64 = 1 << 63;

/// An 80-bit extended-precision value in its raw encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Float80 {
    /// Significand, including the explicit integer bit (bit 63).
    pub significand: u64,
    /// Sign (bit 15) and biased exponent (bits 0-14).
    pub sign_exponent: u16,
}

impl Float80 {
    /// Builds a value from its 10-byte little-endian memory image.
    pub fn from_le_bytes(bytes: [u8; 10]) -> Self {
        let mut significand = [0u8; 8];
        significand.copy_from_slice(&bytes[..8]);
        Self {
            significand: u64::from_le_bytes(significand),
            sign_exponent: u16::from_le_bytes([bytes[8], bytes[9]]),
        }
    }

    /// Returns the 10-byte little-endian memory image.
    pub fn to_le_bytes(self) -> [u8; 10] {
        let mut bytes = [0u8; 10];
        bytes[..8].copy_from_slice(&self.significand.to_le_bytes());
        bytes[8..].copy_from_slice(&self.sign_exponent.to_le_bytes());
        bytes
    }

    /// Returns true if the sign bit is set.
    pub const fn is_sign_negative(self) -> bool {
        self.sign_exponent & 0x8000 != 0
    }

    /// Returns the biased exponent.
    pub const fn exponent(self) -> u16 {
        self.sign_exponent & EXPONENT_SPECIAL
    }

    /// Returns true if the explicit integer bit is set.
    pub const fn integer_bit(self) -> bool {
        self.significand & INTEGER_BIT != 0
    }

    /// Returns the x87 tag this value would carry in a full tag word.
    ///
    /// `0` valid, `1` zero, `2` special (NaN, infinity, denormal, unnormal).
    /// Empty (`3`) is a property of the register slot, not of the value.
    pub const fn tag(self) -> u16 {
        match self.exponent() {
            EXPONENT_SPECIAL => 2,
            0 => {
                if self.significand == 0 {
                    1
                } else {
                    2
                }
            }
            _ => {
                if self.integer_bit() {
                    0
                } else {
                    2
                }
            }
        }
    }

    /// Converts to the nearest `f64`.
    ///
    /// Values outside the `f64` range become infinities or zeros; the extra
    /// significand bits are rounded away.
    pub fn to_f64(self) -> f64 {
        let sign = if self.is_sign_negative() { -1.0 } else { 1.0 };
        let exponent = self.exponent();

        if exponent == EXPONENT_SPECIAL {
            if self.significand & !INTEGER_BIT == 0 {
                return sign * f64::INFINITY;
            }
            return f64::NAN;
        }
        if self.significand == 0 {
            return sign * 0.0;
        }

        // Denormals use the minimum exponent with no implicit scaling.
        let unbiased = i32::from(exponent.max(1)) - EXPONENT_BIAS - 63;
        let low = unbiased / 2;
        let high = unbiased - low;
        sign * (self.significand as f64) * 2f64.powi(low) * 2f64.powi(high)
    }
}

impl fmt::Display for Float80 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_f64(), f)
    }
}
