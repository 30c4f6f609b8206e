//! Eval command implementation.
//!
//! Treats a dump file as the target's memory image mapped at a chosen base
//! address and walks a pointer path through it. The image file's name is
//! exposed as a module, so module-relative expressions resolve against it.

use std::path::Path;

use anyhow::{Context, Result};
use memtrail_core::{Bitness, ImageContext, PointerPath};

/// Run the eval command
pub fn run(expression: &str, image: &Path, base: u64, bitness: Bitness) -> Result<()> {
    let path = PointerPath::parse(expression)
        .with_context(|| format!("failed to parse '{expression}'"))?;

    let mut ctx = ImageContext::from_file(image, base, bitness)
        .with_context(|| format!("failed to load image {image:?}"))?;
    if let Some(name) = image.file_name().and_then(|n| n.to_str()) {
        ctx = ctx.with_module(name);
    }

    println!(
        "Image: {image:?} mapped at {base:#x} ({} bytes, {bitness})",
        ctx.len()
    );

    let resolved = path
        .evaluate(&ctx)
        .with_context(|| format!("failed to evaluate '{path}'"))?;
    println!("Resolved address: {resolved}");
    Ok(())
}
