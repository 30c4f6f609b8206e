//! Collaborator seam between the core and a concrete target process.
//!
//! The core never touches a process directly: raw reads, module lists, OS
//! block grants and region maps all come through the traits below. Tests
//! drive the core with [`mock::MockProcess`]; live targets go through the
//! Windows implementation; captured dumps through [`ImageContext`].

mod image;
#[cfg(target_os = "windows")]
mod live;

#[cfg(test)]
pub mod mock;

pub use image::ImageContext;
#[cfg(target_os = "windows")]
pub use live::LiveProcess;

use crate::error::{OsAllocError, ReadError};
use crate::range::MemoryRange;

/// Pointer width of a target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Bitness {
    #[strum(serialize = "32-bit")]
    Bits32,
    #[strum(serialize = "64-bit")]
    Bits64,
}

impl Bitness {
    pub fn pointer_size(&self) -> usize {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }

    pub fn max_address(&self) -> u64 {
        match self {
            Bitness::Bits32 => u32::MAX as u64,
            Bitness::Bits64 => u64::MAX,
        }
    }

    /// Whether `address` fits this pointer width.
    pub fn admits(&self, address: u64) -> bool {
        address <= self.max_address()
    }

    pub fn address_space(&self) -> MemoryRange {
        match self {
            Bitness::Bits32 => MemoryRange::full_32bit(),
            Bitness::Bits64 => MemoryRange::full_64bit(),
        }
    }
}

/// A loaded module (executable or library image) in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn range(&self) -> Option<MemoryRange> {
        MemoryRange::with_size(self.base, self.size)
    }
}

/// A mapped memory region with its protection flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub range: MemoryRange,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
}

/// Raw memory access to a target process.
pub trait ProcessMemory {
    fn bitness(&self) -> Bitness;

    fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>, ReadError>;

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), ReadError>;

    /// Read a little-endian pointer-sized value at `address`.
    fn read_pointer(&self, address: u64) -> Result<u64, ReadError> {
        let bytes = self.read_bytes(address, self.bitness().pointer_size())?;
        let mut value = [0u8; 8];
        value[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(value))
    }

    /// The addressable space of the target.
    fn address_space(&self) -> MemoryRange {
        self.bitness().address_space()
    }
}

/// Module enumeration for a target process.
pub trait ModuleMap {
    fn modules(&self) -> Vec<ModuleInfo>;

    /// Look up a module by name, ASCII-case-insensitively.
    fn module_named(&self, name: &str) -> Option<ModuleInfo> {
        self.modules()
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// Coarse OS-level block allocation inside the target.
pub trait OsAllocator {
    /// Allocation granularity of the OS primitive. Block requests are
    /// rounded up to a multiple of this.
    fn granularity(&self) -> u64 {
        0x10000
    }

    /// Allocate a block of at least `size` bytes, within `limit` when
    /// given, as close as possible to `near` when given.
    fn alloc_block(
        &self,
        size: u64,
        executable: bool,
        limit: Option<MemoryRange>,
        near: Option<u64>,
    ) -> Result<MemoryRange, OsAllocError>;

    fn free_block(&self, range: MemoryRange) -> Result<(), OsAllocError>;
}

/// Memory-region enumeration, consumed by the pattern scanner.
pub trait RegionMap {
    /// Mapped regions intersecting `bound`, in ascending address order.
    fn regions(&self, bound: MemoryRange) -> Vec<RegionInfo>;
}

/// Everything the core needs from a target process.
pub trait TargetContext: ProcessMemory + ModuleMap + OsAllocator + RegionMap {}

impl<T: ProcessMemory + ModuleMap + OsAllocator + RegionMap> TargetContext for T {}
