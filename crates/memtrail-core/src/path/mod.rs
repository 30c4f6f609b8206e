//! Pointer-path expressions: parsing, evaluation, and persisted sets.
//!
//! A pointer path describes a module-relative or absolute starting address
//! followed by a chain of pointer dereferences, e.g.
//! `"mygame.exe"+1F016644,13,A0,0`. Parsing happens once; the resulting
//! [`PointerPath`] is an immutable value that can be shared across threads
//! and re-evaluated against live process state thousands of times per
//! second without re-parsing.

mod eval;
mod parser;
mod set;

pub use eval::ResolvedAddress;
pub use set::{PathEntry, PathSet, load_paths, load_paths_or_default, save_paths};

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::offset::PathOffset;

/// An immutable, parsed pointer-path expression.
///
/// A path with a base module resolves its starting address through the
/// target's module list; a path without one treats its first offset as a
/// literal starting address (which can never be negative). Every offset
/// after the starting address is a pointer hop: the evaluator reads a
/// pointer-sized value at the current address and adds the offset to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerPath {
    base_module: Option<String>,
    base_offset: PathOffset,
    offsets: Vec<PathOffset>,
    only_64bit: bool,
}

impl PointerPath {
    /// Parse an expression. See the crate docs for the grammar.
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        parser::parse(expression)
    }

    pub(crate) fn from_parts(
        base_module: Option<String>,
        base_offset: PathOffset,
        offsets: Vec<PathOffset>,
    ) -> Self {
        let only_64bit =
            !base_offset.fits_u32() || offsets.iter().any(|offset| !offset.fits_u32());
        Self {
            base_module,
            base_offset,
            offsets,
            only_64bit,
        }
    }

    pub fn base_module(&self) -> Option<&str> {
        self.base_module.as_deref()
    }

    /// Static offset added to the base module's address. Always zero for
    /// module-less paths.
    pub fn base_offset(&self) -> PathOffset {
        self.base_offset
    }

    /// The pointer offsets. For a module-less path the first entry is the
    /// literal starting address, not a hop.
    pub fn offsets(&self) -> &[PathOffset] {
        &self.offsets
    }

    /// Number of pointer dereferences the evaluator will perform.
    pub fn hop_count(&self) -> usize {
        match self.base_module {
            Some(_) => self.offsets.len(),
            None => self.offsets.len().saturating_sub(1),
        }
    }

    /// Whether any offset exceeds the 32-bit range, making the path
    /// unresolvable against a 32-bit target.
    pub fn only_64bit(&self) -> bool {
        self.only_64bit
    }
}

impl fmt::Display for PointerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offsets = self.offsets.iter();
        match &self.base_module {
            Some(name) => {
                let needs_quotes = name
                    .chars()
                    .any(|c| matches!(c, '+' | '-' | ',' | '"') || c.is_whitespace());
                if needs_quotes {
                    write!(f, "\"{name}\"")?;
                } else {
                    write!(f, "{name}")?;
                }
                if !self.base_offset.is_zero() {
                    if self.base_offset.is_negative() {
                        write!(f, "{}", self.base_offset)?;
                    } else {
                        write!(f, "+{}", self.base_offset)?;
                    }
                }
            }
            None => {
                if let Some(first) = offsets.next() {
                    write!(f, "{first}")?;
                }
            }
        }
        for offset in offsets {
            write!(f, ",{offset}")?;
        }
        Ok(())
    }
}

impl FromStr for PointerPath {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
