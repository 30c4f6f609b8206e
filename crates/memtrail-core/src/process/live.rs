//! Live Windows process backing the collaborator traits.
//!
//! Thin shim over `OpenProcess`/`ReadProcessMemory`/`VirtualAllocEx` and
//! friends; all policy (path walking, sub-allocation, scanning) stays in
//! the portable core. Handle lifetime is RAII: dropping a [`LiveProcess`]
//! closes the handle.

use std::ffi::c_void;

use tracing::{debug, warn};
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE, HMODULE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
    MEM_FREE, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE, PAGE_EXECUTE_READ,
    PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_NOACCESS, PAGE_READONLY,
    PAGE_READWRITE, PAGE_WRITECOPY,
};
use windows::Win32::System::ProcessStatus::{
    EnumProcessModulesEx, GetModuleBaseNameW, GetModuleInformation, LIST_MODULES_ALL, MODULEINFO,
};
use windows::Win32::System::Threading::{
    IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use crate::error::{OsAllocError, ReadError};
use crate::process::{Bitness, ModuleInfo, ModuleMap, OsAllocator, ProcessMemory, RegionInfo, RegionMap};
use crate::range::MemoryRange;

/// 64 KiB, the VirtualAlloc allocation granularity.
const ALLOC_GRANULARITY: u64 = 0x10000;

/// Address attempts per direction when honoring a near hint.
const NEAR_ATTEMPTS: u64 = 1024;

pub struct LiveProcess {
    handle: HANDLE,
    pid: u32,
    bitness: Bitness,
}

impl LiveProcess {
    /// Open a process for memory inspection and mutation.
    pub fn open(pid: u32) -> windows::core::Result<Self> {
        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION,
                false,
                pid,
            )?
        };

        // On a 64-bit OS a WOW64 process is the 32-bit case.
        let mut wow64 = BOOL::default();
        unsafe { IsWow64Process(handle, &mut wow64)? };
        let bitness = if wow64.as_bool() {
            Bitness::Bits32
        } else {
            Bitness::Bits64
        };

        debug!(pid, %bitness, "opened target process");
        Ok(Self {
            handle,
            pid,
            bitness,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for LiveProcess {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!(pid = self.pid, error = %e, "failed to close process handle");
        }
    }
}

// The handle is only used for cross-process calls that the kernel
// serializes; no thread affinity is involved.
unsafe impl Send for LiveProcess {}
unsafe impl Sync for LiveProcess {}

impl ProcessMemory for LiveProcess {
    fn bitness(&self) -> Bitness {
        self.bitness
    }

    fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>, ReadError> {
        let mut buffer = vec![0u8; length];
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                length,
                Some(&mut read),
            )
        }
        .map_err(|e| ReadError {
            address,
            length,
            message: e.to_string(),
        })?;
        if read != length {
            return Err(ReadError {
                address,
                length,
                message: format!("short read ({read} bytes)"),
            });
        }
        Ok(buffer)
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), ReadError> {
        let mut written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| ReadError {
            address,
            length: data.len(),
            message: e.to_string(),
        })?;
        if written != data.len() {
            return Err(ReadError {
                address,
                length: data.len(),
                message: format!("short write ({written} bytes)"),
            });
        }
        Ok(())
    }
}

impl ModuleMap for LiveProcess {
    fn modules(&self) -> Vec<ModuleInfo> {
        let mut handles = vec![HMODULE::default(); 1024];
        let mut needed = 0u32;
        let capacity = (handles.len() * size_of::<HMODULE>()) as u32;
        if unsafe {
            EnumProcessModulesEx(
                self.handle,
                handles.as_mut_ptr(),
                capacity,
                &mut needed,
                LIST_MODULES_ALL,
            )
        }
        .is_err()
        {
            return Vec::new();
        }

        let count = (needed as usize / size_of::<HMODULE>()).min(handles.len());
        let mut modules = Vec::with_capacity(count);
        for &module in &handles[..count] {
            let mut name_buf = [0u16; 260];
            let name_len = unsafe { GetModuleBaseNameW(self.handle, module, &mut name_buf) };
            if name_len == 0 {
                continue;
            }
            let name = String::from_utf16_lossy(&name_buf[..name_len as usize]);

            let mut info = MODULEINFO::default();
            if unsafe {
                GetModuleInformation(
                    self.handle,
                    module,
                    &mut info,
                    size_of::<MODULEINFO>() as u32,
                )
            }
            .is_err()
            {
                continue;
            }

            modules.push(ModuleInfo {
                name,
                base: info.lpBaseOfDll as u64,
                size: info.SizeOfImage as u64,
            });
        }
        modules
    }
}

impl OsAllocator for LiveProcess {
    fn granularity(&self) -> u64 {
        ALLOC_GRANULARITY
    }

    fn alloc_block(
        &self,
        size: u64,
        executable: bool,
        limit: Option<MemoryRange>,
        near: Option<u64>,
    ) -> Result<MemoryRange, OsAllocError> {
        let protect = if executable {
            PAGE_EXECUTE_READWRITE
        } else {
            PAGE_READWRITE
        };
        let alloc = |address: Option<u64>| -> Option<u64> {
            let hint = address.map(|a| a as *const c_void);
            let base = unsafe {
                VirtualAllocEx(
                    self.handle,
                    hint,
                    size as usize,
                    MEM_COMMIT | MEM_RESERVE,
                    protect,
                )
            };
            (!base.is_null()).then_some(base as u64)
        };

        // Explicit-address attempts, stepping one granularity unit from the
        // preferred start, so a near hint or bound is honored when possible.
        let preferred = limit.map(|l| l.start()).or(near);
        if let Some(start) = preferred {
            let aligned = start.next_multiple_of(ALLOC_GRANULARITY);
            for attempt in 0..NEAR_ATTEMPTS {
                let candidate = aligned + attempt * ALLOC_GRANULARITY;
                let block = match MemoryRange::with_size(candidate, size) {
                    Some(block) => block,
                    None => break,
                };
                if let Some(limit) = limit
                    && !limit.contains(&block)
                {
                    break;
                }
                if alloc(Some(candidate)).is_some() {
                    debug!(base = candidate, size, "allocated block at preferred address");
                    return Ok(block);
                }
            }
            if limit.is_some() {
                return Err(OsAllocError::new("no block available inside limit range"));
            }
        }

        let base = alloc(None)
            .ok_or_else(|| OsAllocError::new(windows::core::Error::from_win32().to_string()))?;
        MemoryRange::with_size(base, size)
            .ok_or_else(|| OsAllocError::new("allocated block overflows address space"))
    }

    fn free_block(&self, range: MemoryRange) -> Result<(), OsAllocError> {
        unsafe {
            VirtualFreeEx(
                self.handle,
                range.start() as *mut c_void,
                0,
                MEM_RELEASE,
            )
        }
        .map_err(|e| OsAllocError::new(e.to_string()))
    }
}

impl RegionMap for LiveProcess {
    fn regions(&self, bound: MemoryRange) -> Vec<RegionInfo> {
        let mut regions = Vec::new();
        let mut address = bound.start();

        while address <= bound.end() {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let written = unsafe {
                VirtualQueryEx(
                    self.handle,
                    Some(address as *const c_void),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                break;
            }

            let base = info.BaseAddress as u64;
            let Some(region) = MemoryRange::with_size(base, info.RegionSize as u64) else {
                break;
            };
            if info.State != MEM_FREE
                && let Some(clipped) = region.intersect(&bound)
            {
                let protect = info.Protect;
                let guarded = protect.contains(PAGE_GUARD) || protect.contains(PAGE_NOACCESS);
                let readable = !guarded
                    && (protect.contains(PAGE_READONLY)
                        || protect.contains(PAGE_READWRITE)
                        || protect.contains(PAGE_WRITECOPY)
                        || protect.contains(PAGE_EXECUTE_READ)
                        || protect.contains(PAGE_EXECUTE_READWRITE)
                        || protect.contains(PAGE_EXECUTE_WRITECOPY));
                let writable = !guarded
                    && (protect.contains(PAGE_READWRITE)
                        || protect.contains(PAGE_WRITECOPY)
                        || protect.contains(PAGE_EXECUTE_READWRITE)
                        || protect.contains(PAGE_EXECUTE_WRITECOPY));
                let executable = !guarded
                    && (protect.contains(PAGE_EXECUTE)
                        || protect.contains(PAGE_EXECUTE_READ)
                        || protect.contains(PAGE_EXECUTE_READWRITE)
                        || protect.contains(PAGE_EXECUTE_WRITECOPY));
                regions.push(RegionInfo {
                    range: clipped,
                    readable,
                    writable,
                    executable,
                });
            }

            let Some(next) = region.end().checked_add(1) else {
                break;
            };
            if next <= address {
                break;
            }
            address = next;
        }
        regions
    }
}
