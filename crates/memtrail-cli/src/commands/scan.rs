//! Scan command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use memtrail_core::{Bitness, BytePattern, ImageContext, ScanSettings};

/// Run the scan command
pub fn run(pattern: &str, image: &Path, base: u64, limit: usize) -> Result<()> {
    let pattern = BytePattern::parse(pattern)
        .with_context(|| format!("failed to parse pattern '{pattern}'"))?;

    let ctx = ImageContext::from_file(image, base, Bitness::Bits64)
        .with_context(|| format!("failed to load image {image:?}"))?;

    println!(
        "Scanning {image:?} ({} bytes at {base:#x}) for '{pattern}'",
        ctx.len()
    );

    let mut count = 0usize;
    for address in pattern.scan(&ctx, None, ScanSettings::default()).take(limit) {
        println!("  {address:#x} (+{:#x})", address - base);
        count += 1;
    }

    if count == 0 {
        println!("No matches.");
    } else if count == limit {
        println!("Stopped at limit ({limit} matches); more may exist.");
    } else {
        println!("{count} match(es).");
    }
    Ok(())
}
