//! Signed bounded-magnitude offsets used in path parsing and address
//! arithmetic.
//!
//! A [`PathOffset`] covers the full `[-(2^64-1), 2^64-1]` range, which a
//! plain `i64` cannot represent. All arithmetic is checked: an operation
//! that would leave the range returns `None` instead of wrapping.

use std::fmt;

/// An immutable signed offset with a `u64` magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathOffset {
    magnitude: u64,
    negative: bool,
}

impl PathOffset {
    pub const ZERO: PathOffset = PathOffset {
        magnitude: 0,
        negative: false,
    };

    /// Create an offset. A negative zero normalizes to [`PathOffset::ZERO`].
    pub fn new(magnitude: u64, negative: bool) -> Self {
        Self {
            magnitude,
            negative: negative && magnitude != 0,
        }
    }

    pub fn magnitude(&self) -> u64 {
        self.magnitude
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0
    }

    /// Whether the magnitude fits a 32-bit pointer. Paths containing any
    /// offset that fails this check are rejected against 32-bit targets.
    pub fn fits_u32(&self) -> bool {
        self.magnitude <= u32::MAX as u64
    }

    /// Signed addition with explicit overflow detection.
    pub fn checked_add(&self, other: &PathOffset) -> Option<PathOffset> {
        if self.negative == other.negative {
            let magnitude = self.magnitude.checked_add(other.magnitude)?;
            return Some(PathOffset::new(magnitude, self.negative));
        }

        // Opposite signs: subtract the smaller magnitude from the larger,
        // keeping the sign of the larger.
        if self.magnitude >= other.magnitude {
            Some(PathOffset::new(
                self.magnitude - other.magnitude,
                self.negative,
            ))
        } else {
            Some(PathOffset::new(
                other.magnitude - self.magnitude,
                other.negative,
            ))
        }
    }

    /// Shift the magnitude left one hex digit and add `digit`, as used while
    /// scanning an expression. `None` if the magnitude would overflow.
    pub fn push_hex_digit(&self, digit: u8) -> Option<PathOffset> {
        debug_assert!(digit < 16);
        let magnitude = self
            .magnitude
            .checked_mul(16)?
            .checked_add(u64::from(digit))?;
        Some(PathOffset::new(magnitude, self.negative))
    }

    /// Apply this offset to an unsigned address. `None` on overflow in
    /// either direction.
    pub fn apply_to(&self, address: u64) -> Option<u64> {
        if self.negative {
            address.checked_sub(self.magnitude)
        } else {
            address.checked_add(self.magnitude)
        }
    }
}

impl From<u64> for PathOffset {
    fn from(magnitude: u64) -> Self {
        PathOffset::new(magnitude, false)
    }
}

impl fmt::Display for PathOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{:X}", self.magnitude)
        } else {
            write!(f, "{:X}", self.magnitude)
        }
    }
}
