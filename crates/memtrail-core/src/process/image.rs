//! Read-only target context over a captured memory image.
//!
//! Wraps a byte buffer (typically a dump file) and presents it as a target
//! process mapped at a chosen base address. Useful for evaluating paths and
//! running pattern scans against dumps, and as the backing store for the
//! CLI. Writes and OS allocations are rejected.

use std::path::Path;

use crate::error::{OsAllocError, ReadError};
use crate::process::{Bitness, ModuleInfo, ModuleMap, OsAllocator, ProcessMemory, RegionInfo, RegionMap};
use crate::range::MemoryRange;

pub struct ImageContext {
    base: u64,
    bytes: Vec<u8>,
    bitness: Bitness,
    module_name: Option<String>,
}

impl ImageContext {
    pub fn new(base: u64, bytes: Vec<u8>, bitness: Bitness) -> Self {
        Self {
            base,
            bytes,
            bitness,
            module_name: None,
        }
    }

    pub fn from_file<P: AsRef<Path>>(
        path: P,
        base: u64,
        bitness: Bitness,
    ) -> std::io::Result<Self> {
        Ok(Self::new(base, std::fs::read(path)?, bitness))
    }

    /// Expose the whole image as a module with the given name, so
    /// module-relative paths resolve against it.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn image_range(&self) -> Option<MemoryRange> {
        MemoryRange::with_size(self.base, self.bytes.len() as u64)
    }
}

impl ProcessMemory for ImageContext {
    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>, ReadError> {
        let out_of_image = || ReadError {
            address,
            length,
            message: "address outside captured image".to_string(),
        };

        let offset = address.checked_sub(self.base).ok_or_else(out_of_image)? as usize;
        let end = offset.checked_add(length).ok_or_else(out_of_image)?;
        if end > self.bytes.len() {
            return Err(out_of_image());
        }
        Ok(self.bytes[offset..end].to_vec())
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), ReadError> {
        Err(ReadError {
            address,
            length: data.len(),
            message: "image context is read-only".to_string(),
        })
    }
}

impl ModuleMap for ImageContext {
    fn modules(&self) -> Vec<ModuleInfo> {
        match &self.module_name {
            Some(name) => vec![ModuleInfo {
                name: name.clone(),
                base: self.base,
                size: self.bytes.len() as u64,
            }],
            None => Vec::new(),
        }
    }
}

impl OsAllocator for ImageContext {
    fn alloc_block(
        &self,
        _size: u64,
        _executable: bool,
        _limit: Option<MemoryRange>,
        _near: Option<u64>,
    ) -> Result<MemoryRange, OsAllocError> {
        Err(OsAllocError::new("image context cannot allocate memory"))
    }

    fn free_block(&self, _range: MemoryRange) -> Result<(), OsAllocError> {
        Err(OsAllocError::new("image context cannot free memory"))
    }
}

impl RegionMap for ImageContext {
    fn regions(&self, bound: MemoryRange) -> Vec<RegionInfo> {
        self.image_range()
            .and_then(|range| range.intersect(&bound))
            .map(|range| RegionInfo {
                range,
                readable: true,
                writable: false,
                executable: true,
            })
            .into_iter()
            .collect()
    }
}
