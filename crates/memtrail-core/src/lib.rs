//! # memtrail-core
//!
//! Core library for inspecting and mutating the memory of a separate,
//! running target process.
//!
//! This crate provides:
//! - Pointer-path expressions: parsing (`"game.exe"+1F016644,13,A0,0`)
//!   and evaluation against live process state
//! - Pure interval algebra over inclusive memory ranges
//! - A fragmentation-aware sub-allocator carving reservations out of
//!   OS-granted blocks inside the target
//! - Masked byte-pattern (AoB) scanning over mapped regions
//! - Collaborator traits decoupling all of the above from the OS layer,
//!   with dump-file and (on Windows) live-process implementations
//!
//! Process attachment, typed value marshalling and code patching live in
//! the surrounding tooling; this crate only consumes their raw read,
//! module-list and block-allocation primitives through the traits in
//! [`process`].

pub mod alloc;
pub mod error;
pub mod offset;
pub mod path;
pub mod pattern;
pub mod process;
pub mod range;

pub use alloc::{AllocationManager, Reservation, ReservationId, ReserveRequest};
pub use error::{
    AllocError, Error, EvalError, OsAllocError, ParseError, PatternError, ReadError, Result,
};
pub use offset::PathOffset;
pub use path::{
    PathEntry, PathSet, PointerPath, ResolvedAddress, load_paths, load_paths_or_default,
    save_paths,
};
pub use pattern::{BytePattern, PatternScan, ScanSettings};
pub use process::{
    Bitness, ImageContext, ModuleInfo, ModuleMap, OsAllocator, ProcessMemory, RegionInfo,
    RegionMap, TargetContext,
};
#[cfg(target_os = "windows")]
pub use process::LiveProcess;
pub use range::{AlignmentMode, MemoryRange, RangeExclusion};
