//! Unpack command: export every asset of a package to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datpack::{PackageReader, classify};
use tracing::{info, warn};

/// Export all assets to `output` (or `<input without extension>/`).
///
/// With `by_category`, assets land in `output/<category>/name` using the
/// extension-based classifier. Per-asset read failures and names that
/// could escape the export root are logged and skipped; only an unreadable
/// index aborts the whole export.
pub fn unpack(input: &Path, output: Option<&Path>, by_category: bool) -> Result<()> {
    let mut reader = PackageReader::open(input)
        .with_context(|| format!("opening package {}", input.display()))?;
    let root = match output {
        Some(p) => p.to_path_buf(),
        None => default_output(input),
    };
    fs::create_dir_all(&root)?;

    let names: Vec<String> = reader.list_assets().iter().map(|s| (*s).to_owned()).collect();
    let mut exported = 0usize;
    let mut failed = 0usize;
    for name in &names {
        // Asset names are flat file names; a separator or dot-dot in a
        // hostile package would escape the export root.
        if !is_safe_name(name) {
            warn!(asset = %name, "skipping asset with unsafe name");
            failed += 1;
            continue;
        }
        let bytes = match reader.read_asset(name) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(asset = %name, %err, "skipping unreadable asset");
                failed += 1;
                continue;
            }
        };
        let dest = if by_category {
            let category_dir = root.join(classify(name).as_str());
            fs::create_dir_all(&category_dir)?;
            category_dir.join(name)
        } else {
            root.join(name)
        };
        fs::write(&dest, bytes).with_context(|| format!("writing {}", dest.display()))?;
        exported += 1;
    }
    info!(package = %input.display(), exported, failed, "export finished");
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("")
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && name != "." && name != ".."
}
