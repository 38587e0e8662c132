//! List command: show every asset with its category and compressed size.

use std::path::Path;

use anyhow::{Context, Result};
use datpack::{PackageReader, classify};

/// Print one line per asset: compressed size, category, name.
pub fn list(input: &Path) -> Result<()> {
    let reader = PackageReader::open(input)
        .with_context(|| format!("opening package {}", input.display()))?;
    for entry in reader.index().iter() {
        println!(
            "{:>10}  {:<6}  {}",
            entry.length,
            classify(&entry.name),
            entry.name
        );
    }
    println!("{} assets", reader.index().len());
    Ok(())
}
