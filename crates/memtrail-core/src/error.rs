use thiserror::Error;

use crate::process::Bitness;
use crate::range::MemoryRange;

/// Errors produced while parsing a pointer-path expression.
///
/// These are always caller-input problems and are reported before any
/// interaction with the target process. `position` fields are character
/// indices into the trimmed expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    EmptyExpression,

    #[error("expression ends with '{0}'")]
    TrailingOperator(char),

    #[error("operator '{operator}' at position {position} follows another operator")]
    AdjacentOperators { operator: char, position: usize },

    #[error("expected hex digits at position {position}")]
    MissingDigits { position: usize },

    #[error("invalid character '{character}' at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("term at position {position} has more than 16 hex digits")]
    TermTooLong { position: usize },

    #[error("unterminated quoted module name")]
    UnterminatedQuote,

    #[error("quoted module name is empty")]
    EmptyModuleName,

    #[error("starting address cannot be negative")]
    NegativeBaseAddress,

    #[error("offset sum at position {position} exceeds the representable range")]
    OffsetSumOutOfRange { position: usize },
}

/// A raw-read failure reported by a process-memory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to read {length} bytes at {address:#x}: {message}")]
pub struct ReadError {
    pub address: u64,
    pub length: usize,
    pub message: String,
}

/// Errors produced while walking a parsed path through target memory.
///
/// Each variant carries the address at which the walk went wrong, so a
/// failing hop can be pinpointed without re-running the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("path requires a 64-bit target but the process is {target}")]
    IncompatibleBitness { target: Bitness },

    #[error("base module not found: {0}")]
    BaseModuleNotFound(String),

    #[error("pointer arithmetic out of range at {address:#x}")]
    PointerOutOfRange { address: u64 },

    #[error("pointer chain produced a null address at {address:#x}")]
    ZeroPointer { address: u64 },

    #[error("failed to read pointer at {address:#x}")]
    PointerReadFailure {
        address: u64,
        #[source]
        source: ReadError,
    },
}

/// An OS-level block allocation or release failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("OS memory operation failed: {message}")]
pub struct OsAllocError {
    pub message: String,
}

impl OsAllocError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors produced by the allocation and reservation manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("requested reservation size is zero")]
    ZeroSize,

    #[error("limit range {limit} is outside the addressable space {space}")]
    LimitRangeOutOfBounds {
        limit: MemoryRange,
        space: MemoryRange,
    },

    #[error("no free memory range satisfies the request")]
    NoFreeMemoryFound,

    #[error("no free space available in the target allocation")]
    NoSpaceAvailable,

    #[error("operation on an already-freed allocation node")]
    DisposedAllocation,

    #[error("OS block allocation failed")]
    OsAllocFailed(#[from] OsAllocError),
}

/// Errors produced while compiling a byte-pattern expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    EmptyPattern,

    #[error("pattern contains only wildcards")]
    AllWildcards,

    #[error("invalid pattern token '{0}'")]
    InvalidToken(String),
}

/// Umbrella error for callers that do not branch on the failure category.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("allocation error: {0}")]
    Alloc(#[from] AllocError),

    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("read error: {0}")]
    Read(#[from] ReadError),

    #[error("path entry '{name}' holds an invalid expression")]
    InvalidPathEntry {
        name: String,
        #[source]
        source: ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the underlying cause is a missing file, so callers loading
    /// optional files can fall back to a default instead of failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
