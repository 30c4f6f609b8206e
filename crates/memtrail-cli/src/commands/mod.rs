//! CLI command implementations.

pub mod eval;
pub mod parse;
pub mod scan;
