//! Parse command implementation.

use anyhow::{Context, Result};
use memtrail_core::PointerPath;

/// Run the parse command
pub fn run(expression: &str) -> Result<()> {
    let path = PointerPath::parse(expression)
        .with_context(|| format!("failed to parse '{expression}'"))?;

    println!("Expression: {path}");
    match path.base_module() {
        Some(module) => {
            println!("Base module: {module}");
            println!("Module offset: {} (hex)", path.base_offset());
        }
        None => {
            println!("Base module: (none, literal start address)");
        }
    }
    println!("Pointer hops: {}", path.hop_count());
    for (i, offset) in path.offsets().iter().enumerate() {
        println!("  [{i}] {offset}");
    }
    println!(
        "Target compatibility: {}",
        if path.only_64bit() {
            "64-bit only"
        } else {
            "32-bit and 64-bit"
        }
    );
    Ok(())
}
