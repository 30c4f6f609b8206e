//! Pure interval algebra over inclusive address ranges.
//!
//! Everything here is side-effect free and wraparound safe: arithmetic that
//! would leave the `u64` address space is clamped or reported as "no fit",
//! never wrapped.

use std::fmt;

/// How [`MemoryRange::aligned_to`] adjusts a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentMode {
    /// Return the range unchanged.
    None,
    /// Round the start up to the next multiple of the alignment.
    AlignStart,
    /// Round the start up and truncate the size down to a multiple of the
    /// alignment.
    AlignBlock,
}

/// An inclusive `[start, end]` address range. Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    start: u64,
    end: u64,
}

/// What remains of a range after excluding another, see
/// [`MemoryRange::exclude`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeExclusion {
    /// The excluded range fully covered the original.
    Empty,
    /// One contiguous sub-range remains.
    One(MemoryRange),
    /// The excluded range split the original in two.
    Two(MemoryRange, MemoryRange),
}

impl RangeExclusion {
    pub fn into_vec(self) -> Vec<MemoryRange> {
        match self {
            RangeExclusion::Empty => vec![],
            RangeExclusion::One(r) => vec![r],
            RangeExclusion::Two(a, b) => vec![a, b],
        }
    }
}

impl MemoryRange {
    /// Create a range from inclusive bounds. `None` if `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a range from a start address and a byte count. `None` for a
    /// zero size or when the end would overflow the address space.
    pub fn with_size(start: u64, size: u64) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let end = start.checked_add(size - 1)?;
        Some(Self { start, end })
    }

    /// The full 32-bit address space.
    pub fn full_32bit() -> Self {
        Self {
            start: 0,
            end: u32::MAX as u64,
        }
    }

    /// The full 64-bit address space.
    pub fn full_64bit() -> Self {
        Self {
            start: 0,
            end: u64::MAX,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of addresses covered, saturating at `u64::MAX` for the full
    /// 64-bit space.
    pub fn byte_len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    pub fn is_in_range(&self, address: u64) -> bool {
        self.start <= address && address <= self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &MemoryRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &MemoryRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The common sub-range of two ranges, if any.
    pub fn intersect(&self, other: &MemoryRange) -> Option<MemoryRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        MemoryRange::new(start, end)
    }

    /// Set difference: the parts of this range not covered by `other`.
    pub fn exclude(&self, other: &MemoryRange) -> RangeExclusion {
        if !self.overlaps(other) {
            return RangeExclusion::One(*self);
        }
        if other.contains(self) {
            return RangeExclusion::Empty;
        }

        // Overlapping but not fully covered: at least one side survives.
        // The bound arithmetic cannot wrap because the surviving side
        // proves the neighboring bound is interior.
        let before = if other.start > self.start {
            MemoryRange::new(self.start, other.start - 1)
        } else {
            None
        };
        let after = if other.end < self.end {
            MemoryRange::new(other.end + 1, self.end)
        } else {
            None
        };

        match (before, after) {
            (Some(a), Some(b)) => RangeExclusion::Two(a, b),
            (Some(a), None) | (None, Some(a)) => RangeExclusion::One(a),
            (None, None) => RangeExclusion::Empty,
        }
    }

    /// Align this range per `mode`. `None` when alignment pushes the start
    /// past the end, or truncation leaves nothing. An alignment of 0 or 1
    /// is a no-op.
    pub fn aligned_to(&self, alignment: u64, mode: AlignmentMode) -> Option<MemoryRange> {
        if matches!(mode, AlignmentMode::None) || alignment <= 1 {
            return Some(*self);
        }

        let rem = self.start % alignment;
        let start = if rem == 0 {
            self.start
        } else {
            self.start.checked_add(alignment - rem)?
        };
        if start > self.end {
            return None;
        }

        match mode {
            AlignmentMode::AlignStart => MemoryRange::new(start, self.end),
            AlignmentMode::AlignBlock => {
                let size = self.end - start + 1;
                let truncated = size - (size % alignment);
                if truncated == 0 {
                    return None;
                }
                MemoryRange::new(start, start + truncated - 1)
            }
            AlignmentMode::None => unreachable!(),
        }
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}
