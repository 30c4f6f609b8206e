//! In-memory fake target process for tests.
//!
//! Built through [`MockProcessBuilder`]; backs reads with explicit byte
//! segments, serves a fixed module list, and grants OS blocks from a bump
//! cursor while recording every allocator call for assertions.

use std::cell::RefCell;

use crate::error::{OsAllocError, ReadError};
use crate::process::{Bitness, ModuleInfo, OsAllocator, ProcessMemory, RegionInfo, RegionMap};
use crate::range::MemoryRange;

#[derive(Debug, Clone)]
struct Segment {
    base: u64,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub size: u64,
    pub executable: bool,
    pub limit: Option<MemoryRange>,
    pub near: Option<u64>,
}

pub struct MockProcess {
    bitness: Bitness,
    modules: Vec<ModuleInfo>,
    segments: RefCell<Vec<Segment>>,
    regions: Vec<RegionInfo>,
    granularity: u64,
    alloc_cursor: RefCell<u64>,
    requests: RefCell<Vec<BlockRequest>>,
    granted: RefCell<Vec<MemoryRange>>,
    freed: RefCell<Vec<MemoryRange>>,
    fail_alloc: bool,
}

impl MockProcess {
    pub fn builder() -> MockProcessBuilder {
        MockProcessBuilder::default()
    }

    pub fn alloc_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<BlockRequest> {
        self.requests.borrow().clone()
    }

    pub fn granted_blocks(&self) -> Vec<MemoryRange> {
        self.granted.borrow().clone()
    }

    pub fn freed_blocks(&self) -> Vec<MemoryRange> {
        self.freed.borrow().clone()
    }

    fn segment_read(&self, address: u64, length: usize) -> Option<Vec<u8>> {
        let segments = self.segments.borrow();
        for segment in segments.iter() {
            if let Some(offset) = address.checked_sub(segment.base).map(|o| o as usize)
                && offset + length <= segment.data.len()
            {
                return Some(segment.data[offset..offset + length].to_vec());
            }
        }
        None
    }
}

impl ProcessMemory for MockProcess {
    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>, ReadError> {
        self.segment_read(address, length).ok_or_else(|| ReadError {
            address,
            length,
            message: "address not backed by mock segment".to_string(),
        })
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), ReadError> {
        let mut segments = self.segments.borrow_mut();
        for segment in segments.iter_mut() {
            if let Some(offset) = address.checked_sub(segment.base).map(|o| o as usize)
                && offset + data.len() <= segment.data.len()
            {
                segment.data[offset..offset + data.len()].copy_from_slice(data);
                return Ok(());
            }
        }
        Err(ReadError {
            address,
            length: data.len(),
            message: "address not backed by mock segment".to_string(),
        })
    }
}

impl crate::process::ModuleMap for MockProcess {
    fn modules(&self) -> Vec<ModuleInfo> {
        self.modules.clone()
    }
}

impl OsAllocator for MockProcess {
    fn granularity(&self) -> u64 {
        self.granularity
    }

    fn alloc_block(
        &self,
        size: u64,
        executable: bool,
        limit: Option<MemoryRange>,
        near: Option<u64>,
    ) -> Result<MemoryRange, OsAllocError> {
        self.requests.borrow_mut().push(BlockRequest {
            size,
            executable,
            limit,
            near,
        });
        if self.fail_alloc {
            return Err(OsAllocError::new("mock allocator configured to fail"));
        }

        let align_up = |addr: u64| addr.next_multiple_of(self.granularity);
        let start = match limit {
            Some(limit) => align_up(limit.start()),
            None => match near {
                Some(near) => align_up(near.saturating_sub(near % self.granularity)),
                None => *self.alloc_cursor.borrow(),
            },
        };

        let block = MemoryRange::with_size(start, size)
            .ok_or_else(|| OsAllocError::new("mock block overflows address space"))?;
        if let Some(limit) = limit
            && !limit.contains(&block)
        {
            return Err(OsAllocError::new("mock block does not fit limit range"));
        }

        let mut cursor = self.alloc_cursor.borrow_mut();
        if block.end() >= *cursor {
            *cursor = align_up(block.end() + 1);
        }
        self.granted.borrow_mut().push(block);
        Ok(block)
    }

    fn free_block(&self, range: MemoryRange) -> Result<(), OsAllocError> {
        self.freed.borrow_mut().push(range);
        Ok(())
    }
}

impl RegionMap for MockProcess {
    fn regions(&self, bound: MemoryRange) -> Vec<RegionInfo> {
        let mut regions: Vec<RegionInfo> = self
            .regions
            .iter()
            .filter_map(|r| {
                r.range.intersect(&bound).map(|range| RegionInfo {
                    range,
                    ..*r
                })
            })
            .collect();
        regions.sort_by_key(|r| r.range.start());
        regions
    }
}

#[derive(Default)]
pub struct MockProcessBuilder {
    bitness: Option<Bitness>,
    modules: Vec<ModuleInfo>,
    segments: Vec<Segment>,
    regions: Vec<RegionInfo>,
    granularity: Option<u64>,
    alloc_base: Option<u64>,
    fail_alloc: bool,
}

impl MockProcessBuilder {
    pub fn bitness(mut self, bitness: Bitness) -> Self {
        self.bitness = Some(bitness);
        self
    }

    pub fn module(mut self, name: &str, base: u64, size: u64) -> Self {
        self.modules.push(ModuleInfo {
            name: name.to_string(),
            base,
            size,
        });
        self
    }

    pub fn bytes(mut self, base: u64, data: &[u8]) -> Self {
        self.segments.push(Segment {
            base,
            data: data.to_vec(),
        });
        self
    }

    /// Back an 8-byte little-endian pointer value at `address`.
    pub fn pointer(self, address: u64, value: u64) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn region(mut self, range: MemoryRange, readable: bool, writable: bool, executable: bool) -> Self {
        self.regions.push(RegionInfo {
            range,
            readable,
            writable,
            executable,
        });
        self
    }

    pub fn granularity(mut self, granularity: u64) -> Self {
        self.granularity = Some(granularity);
        self
    }

    /// First address handed out by the mock OS allocator.
    pub fn alloc_base(mut self, base: u64) -> Self {
        self.alloc_base = Some(base);
        self
    }

    pub fn fail_alloc(mut self) -> Self {
        self.fail_alloc = true;
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            bitness: self.bitness.unwrap_or(Bitness::Bits64),
            modules: self.modules,
            segments: RefCell::new(self.segments),
            regions: self.regions,
            granularity: self.granularity.unwrap_or(0x1000),
            alloc_cursor: RefCell::new(self.alloc_base.unwrap_or(0x7000_0000)),
            requests: RefCell::new(Vec::new()),
            granted: RefCell::new(Vec::new()),
            freed: RefCell::new(Vec::new()),
            fail_alloc: self.fail_alloc,
        }
    }
}
