//! Pointer-path evaluation against a live target.
//!
//! Evaluation is a pure function of the path and the target's current
//! memory: no caching, no internal state, safe to run concurrently from
//! multiple threads over the same [`PointerPath`]. A target that mutates
//! mid-walk surfaces as a failed hop, never as a fabricated address.

use std::fmt;

use tracing::{debug, trace};

use crate::error::EvalError;
use crate::offset::PathOffset;
use crate::path::PointerPath;
use crate::process::{Bitness, ModuleMap, ProcessMemory};

/// An address proven reachable and bitness-compatible for a specific
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    address: u64,
    bitness: Bitness,
}

impl ResolvedAddress {
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn bitness(&self) -> Bitness {
        self.bitness
    }
}

impl From<ResolvedAddress> for u64 {
    fn from(resolved: ResolvedAddress) -> u64 {
        resolved.address
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.address)
    }
}

impl PointerPath {
    /// Walk this path through the target's memory to its final address.
    ///
    /// Failures carry the address at which the walk went wrong; see
    /// [`EvalError`].
    pub fn evaluate<C>(&self, ctx: &C) -> Result<ResolvedAddress, EvalError>
    where
        C: ProcessMemory + ModuleMap,
    {
        let bitness = ctx.bitness();
        if self.only_64bit() && bitness == Bitness::Bits32 {
            return Err(EvalError::IncompatibleBitness { target: bitness });
        }

        let (base, hops) = match self.base_module() {
            Some(name) => {
                let module = ctx
                    .module_named(name)
                    .ok_or_else(|| EvalError::BaseModuleNotFound(name.to_string()))?;
                debug!(module = name, base = module.base, "resolved base module");
                (module.base, self.offsets())
            }
            None => {
                let (first, rest) = self
                    .offsets()
                    .split_first()
                    .map(|(f, r)| (*f, r))
                    .unwrap_or((PathOffset::ZERO, &[]));
                (first.magnitude(), rest)
            }
        };

        let mut address = checked_step(base, self.base_offset(), bitness, base)?;

        for offset in hops {
            let value = ctx
                .read_pointer(address)
                .map_err(|source| EvalError::PointerReadFailure { address, source })?;
            trace!(at = address, value, %offset, "pointer hop");
            address = checked_step(value, *offset, bitness, address)?;
        }

        Ok(ResolvedAddress { address, bitness })
    }
}

/// Apply `offset` to `value`, rejecting overflow, a null result, and an
/// address the target's pointer width cannot represent. `site` is the
/// address the failure is reported against.
fn checked_step(
    value: u64,
    offset: PathOffset,
    bitness: Bitness,
    site: u64,
) -> Result<u64, EvalError> {
    let next = offset
        .apply_to(value)
        .ok_or(EvalError::PointerOutOfRange { address: site })?;
    if next == 0 {
        return Err(EvalError::ZeroPointer { address: site });
    }
    if !bitness.admits(next) {
        return Err(EvalError::PointerOutOfRange { address: next });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockProcess;

    #[test]
    fn test_literal_base_with_hops() {
        // 0x1000 -> read 0x2000, +0x10 -> read at 0x2010 -> 0x3000
        let ctx = MockProcess::builder()
            .pointer(0x1000, 0x2000)
            .pointer(0x2010, 0x3000)
            .build();
        let path = PointerPath::parse("1000,10,0").unwrap();
        assert_eq!(path.evaluate(&ctx).unwrap().address(), 0x3000);
    }

    #[test]
    fn test_module_relative_base() {
        let ctx = MockProcess::builder()
            .module("game.exe", 0x1_0000, 0x1000)
            .pointer(0x1_0040, 0x5000)
            .build();
        let path = PointerPath::parse("game.exe+40,8").unwrap();
        assert_eq!(path.evaluate(&ctx).unwrap().address(), 0x5008);
    }

    #[test]
    fn test_module_lookup_is_case_insensitive() {
        let ctx = MockProcess::builder()
            .module("Game.exe", 0x1_0000, 0x1000)
            .build();
        let path = PointerPath::parse("GAME.EXE+40").unwrap();
        assert_eq!(path.evaluate(&ctx).unwrap().address(), 0x1_0040);
    }

    #[test]
    fn test_missing_module() {
        let ctx = MockProcess::builder().build();
        let path = PointerPath::parse("absent.dll+10").unwrap();
        assert_eq!(
            path.evaluate(&ctx),
            Err(EvalError::BaseModuleNotFound("absent.dll".to_string()))
        );
    }

    #[test]
    fn test_zero_pointer_fails() {
        let ctx = MockProcess::builder().pointer(0x1000, 0).build();
        let path = PointerPath::parse("1000,0,4").unwrap();
        assert_eq!(
            path.evaluate(&ctx),
            Err(EvalError::ZeroPointer { address: 0x1000 })
        );
    }

    #[test]
    fn test_literal_zero_base_fails() {
        let ctx = MockProcess::builder().build();
        let path = PointerPath::parse("0").unwrap();
        assert!(matches!(
            path.evaluate(&ctx),
            Err(EvalError::ZeroPointer { .. })
        ));
    }

    #[test]
    fn test_read_failure_carries_address() {
        let ctx = MockProcess::builder().build();
        let path = PointerPath::parse("1000,10").unwrap();
        assert!(matches!(
            path.evaluate(&ctx),
            Err(EvalError::PointerReadFailure { address: 0x1000, .. })
        ));
    }

    #[test]
    fn test_overflow_rejected() {
        let ctx = MockProcess::builder()
            .pointer(0x1000, u64::MAX)
            .build();
        let path = PointerPath::parse("1000,2").unwrap();
        assert_eq!(
            path.evaluate(&ctx),
            Err(EvalError::PointerOutOfRange { address: 0x1000 })
        );
    }

    #[test]
    fn test_bitness_gate_rejects_64bit_only_path() {
        let ctx = MockProcess::builder().bitness(Bitness::Bits32).build();
        let path = PointerPath::parse("100000000,10").unwrap();
        assert_eq!(
            path.evaluate(&ctx),
            Err(EvalError::IncompatibleBitness {
                target: Bitness::Bits32
            })
        );
    }

    #[test]
    fn test_32bit_target_reads_4_byte_pointers() {
        let ctx = MockProcess::builder()
            .bitness(Bitness::Bits32)
            .bytes(0x1000, &0x2000u32.to_le_bytes())
            .build();
        let path = PointerPath::parse("1000,4").unwrap();
        assert_eq!(path.evaluate(&ctx).unwrap().address(), 0x2004);
    }

    #[test]
    fn test_32bit_target_rejects_wide_intermediate_address() {
        // Every offset fits 32 bits, but the value read from memory does not.
        let ctx = MockProcess::builder()
            .bitness(Bitness::Bits32)
            .bytes(0x1000, &0xFFFF_FFF0u32.to_le_bytes())
            .build();
        let path = PointerPath::parse("1000,20").unwrap();
        assert_eq!(
            path.evaluate(&ctx),
            Err(EvalError::PointerOutOfRange {
                address: 0x1_0000_0010
            })
        );
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let ctx = MockProcess::builder().pointer(0x1000, 0x2000).build();
        let path = PointerPath::parse("1000,0").unwrap();
        let first = path.evaluate(&ctx).unwrap();
        let second = path.evaluate(&ctx).unwrap();
        assert_eq!(first, second);
    }
}
