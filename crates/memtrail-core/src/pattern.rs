//! Masked byte-sequence (AoB) search over target memory.
//!
//! A pattern like `4D ?? 5?` compiles to parallel byte/mask arrays: a mask
//! of `0xFF` requires an exact match, `0xF0`/`0x0F` match only the high or
//! low nibble, `0x00` matches anything. Scanning walks the collaborator's
//! readable regions in ascending address order and yields matches lazily,
//! so a caller can stop after the first hit without paying for the rest of
//! the scan.

use std::fmt;

use tracing::debug;

use crate::error::PatternError;
use crate::process::{ProcessMemory, RegionInfo, RegionMap};
use crate::range::MemoryRange;

/// Region filters for a scan. Readability is always required; the other
/// flags are matched only when set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSettings {
    pub writable: Option<bool>,
    pub executable: Option<bool>,
}

/// A compiled masked byte pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    /// Pattern bytes, pre-masked so comparison is a single AND-compare.
    bytes: Vec<u8>,
    mask: Vec<u8>,
}

impl BytePattern {
    /// Compile a whitespace-separated pattern. Tokens are two hex digits,
    /// either of which may be `?`; `??` (or a bare `?`) matches any byte.
    /// At least one non-wildcard byte is required.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        for token in text.split_whitespace() {
            if token == "?" || token == "??" {
                bytes.push(0);
                mask.push(0);
                continue;
            }

            let mut chars = token.chars();
            let (high, low) = match (chars.next(), chars.next(), chars.next()) {
                (Some(h), Some(l), None) => (h, l),
                _ => return Err(PatternError::InvalidToken(token.to_string())),
            };
            let nibble = |c: char| -> Result<(u8, u8), PatternError> {
                if c == '?' {
                    return Ok((0, 0));
                }
                c.to_digit(16)
                    .map(|v| (v as u8, 0xF))
                    .ok_or_else(|| PatternError::InvalidToken(token.to_string()))
            };
            let (hv, hm) = nibble(high)?;
            let (lv, lm) = nibble(low)?;
            let m = (hm << 4) | lm;
            bytes.push(((hv << 4) | lv) & m);
            mask.push(m);
        }

        if bytes.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        if mask.iter().all(|&m| m == 0) {
            return Err(PatternError::AllWildcards);
        }
        Ok(Self { bytes, mask })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The first byte when it must match exactly. A pattern opening with
    /// any wildcard nibble cannot use the skip optimization and scans
    /// linearly, which is documented as slower.
    fn exact_leading_byte(&self) -> Option<u8> {
        (self.mask[0] == 0xFF).then_some(self.bytes[0])
    }

    /// Whether the pattern matches `data` at `position`.
    pub fn matches_at(&self, data: &[u8], position: usize) -> bool {
        let Some(window) = data.get(position..position + self.len()) else {
            return false;
        };
        window
            .iter()
            .zip(self.bytes.iter().zip(self.mask.iter()))
            .all(|(&byte, (&expected, &mask))| byte & mask == expected)
    }

    /// First match in `data` at or after `from`.
    pub fn find_in(&self, data: &[u8], from: usize) -> Option<usize> {
        if data.len() < self.len() {
            return None;
        }
        let last = data.len() - self.len();

        match self.exact_leading_byte() {
            Some(first) => {
                let mut position = from;
                while position <= last {
                    let found = memchr::memchr(first, &data[position..=last])? + position;
                    if self.matches_at(data, found) {
                        return Some(found);
                    }
                    position = found + 1;
                }
                None
            }
            None => (from..=last).find(|&p| self.matches_at(data, p)),
        }
    }

    /// Lazily scan the target's regions within `bound` (defaulting to the
    /// whole address space), yielding match addresses in ascending order.
    pub fn scan<'a, C>(
        &'a self,
        ctx: &'a C,
        bound: Option<MemoryRange>,
        settings: ScanSettings,
    ) -> PatternScan<'a, C>
    where
        C: ProcessMemory + RegionMap,
    {
        let bound = bound.unwrap_or_else(|| ctx.address_space());
        let mut regions: Vec<RegionInfo> = ctx
            .regions(bound)
            .into_iter()
            .filter(|r| r.readable)
            .filter(|r| settings.writable.is_none_or(|w| r.writable == w))
            .filter(|r| settings.executable.is_none_or(|x| r.executable == x))
            // The bound holds even against a region map that ignores it.
            .filter_map(|r| r.range.intersect(&bound).map(|range| RegionInfo { range, ..r }))
            .collect();
        regions.sort_by_key(|r| r.range.start());

        PatternScan {
            pattern: self,
            ctx,
            regions: regions.into_iter(),
            current: None,
        }
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (&byte, &mask)) in self.bytes.iter().zip(self.mask.iter()).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            let nibble = |value: u8, mask: u8| -> char {
                if mask == 0 {
                    '?'
                } else {
                    char::from_digit(u32::from(value), 16)
                        .unwrap_or('?')
                        .to_ascii_uppercase()
                }
            };
            write!(f, "{}{}", nibble(byte >> 4, mask >> 4), nibble(byte & 0xF, mask & 0xF))?;
        }
        Ok(())
    }
}

/// Lazy scan over a target's regions. Restart by re-invoking
/// [`BytePattern::scan`]; the iterator cannot be rewound.
pub struct PatternScan<'a, C> {
    pattern: &'a BytePattern,
    ctx: &'a C,
    regions: std::vec::IntoIter<RegionInfo>,
    /// Region currently being walked: base address, bytes, next position.
    current: Option<(u64, Vec<u8>, usize)>,
}

impl<'a, C> Iterator for PatternScan<'a, C>
where
    C: ProcessMemory + RegionMap,
{
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some((base, data, position)) = &mut self.current {
                if let Some(found) = self.pattern.find_in(data, *position) {
                    *position = found + 1;
                    return Some(*base + found as u64);
                }
                self.current = None;
            }

            let region = self.regions.next()?;
            let length = region.range.byte_len() as usize;
            match self.ctx.read_bytes(region.range.start(), length) {
                Ok(data) if data.len() >= self.pattern.len() => {
                    self.current = Some((region.range.start(), data, 0));
                }
                Ok(_) => {}
                Err(e) => {
                    // Regions can vanish mid-scan; skip rather than abort.
                    debug!(start = region.range.start(), error = %e, "skipping unreadable region");
                }
            }
        }
    }
}
