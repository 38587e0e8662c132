//! Pack command: bundle a directory of assets into one package file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use datpack::PackageWriter;
use tracing::info;
use walkdir::WalkDir;

/// Walk `input_dir` and write every regular file into a package.
///
/// Asset names are flattened to the file name alone, matching what the
/// client expects; two files with the same name in different subdirectories
/// abort the pack with a duplicate-name error and leave no output behind.
pub fn pack(input_dir: &Path, output: Option<&Path>) -> Result<()> {
    if !input_dir.is_dir() {
        bail!("not a directory: {}", input_dir.display());
    }
    let output = match output {
        Some(p) => p.to_path_buf(),
        None => default_output(input_dir),
    };

    let result = write_package(input_dir, &output);
    if result.is_err() {
        let _ = fs::remove_file(&output);
    }
    result
}

fn write_package(input_dir: &Path, output: &Path) -> Result<()> {
    let mut writer =
        PackageWriter::create(output).with_context(|| format!("creating {}", output.display()))?;

    let mut count = 0usize;
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .to_str()
            .with_context(|| format!("non-UTF-8 file name: {}", entry.path().display()))?;
        let raw = fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        writer
            .add(name, &raw)
            .with_context(|| format!("adding {}", entry.path().display()))?;
        count += 1;
    }
    writer.finish()?;
    info!(package = %output.display(), assets = count, "package written");
    Ok(())
}

fn default_output(input_dir: &Path) -> PathBuf {
    input_dir.with_extension("dat")
}
