//! Package reader and writer.
//!
//! On-disk layout, big-endian multi-byte integers:
//!
//! ```text
//! [0, 4)               u32    offset of the compressed index
//! [4, index_offset)    bytes  raw-deflate blobs, one per asset
//! [index_offset, EOF)  bytes  raw-deflate AMF3 index (name -> [offset, length])
//! ```
//!
//! The writer lays blobs out sequentially, appends the compressed index, and
//! backpatches the 4-byte header. The reader holds the file handle open and
//! materializes assets on demand.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::deflate;
use crate::index::{IndexError, PackageIndex};

const HEADER_LEN: u64 = 4;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt deflate stream: {0}")]
    CorruptStream(String),

    #[error("corrupt package index: {0}")]
    IndexCorrupt(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("asset not found in package: {0}")]
    AssetNotFound(String),

    #[error("package reader is closed")]
    Closed,

    #[error("package too large: offset {0} does not fit in the 4-byte header")]
    TooLarge(u64),
}

/// Read-only view of a package file.
///
/// The index is decoded once at `open`; assets are decompressed on demand.
/// The underlying handle is exclusively owned until [`PackageReader::close`]
/// or drop.
#[derive(Debug)]
pub struct PackageReader {
    file: Option<File>,
    index: PackageIndex,
}

impl PackageReader {
    /// Open a package and decode its index.
    ///
    /// File-level failures (missing file, short header) surface as
    /// [`PackageError::Io`]; a header that points at data which does not
    /// decompress or decode to a well-formed index is
    /// [`PackageError::IndexCorrupt`] and fatal for the whole package.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut header = [0u8; 4];
        file.read_exact(&mut header)?;
        let index_offset = u64::from(u32::from_be_bytes(header));
        file.seek(SeekFrom::Start(index_offset))?;
        let mut compressed = Vec::new();
        file.read_to_end(&mut compressed)?;
        let raw = deflate::decompress(&compressed).map_err(|e| {
            PackageError::IndexCorrupt(format!("index at offset {index_offset}: {e}"))
        })?;
        let index = PackageIndex::from_bytes(&raw)
            .map_err(|e| PackageError::IndexCorrupt(e.to_string()))?;
        // Entries live in the body, before the index. Checking that here
        // also bounds every later read_asset allocation by the file size,
        // so a lying index cannot demand an arbitrary buffer.
        for entry in index.iter() {
            let end = u64::from(entry.offset) + u64::from(entry.length);
            if end > index_offset {
                return Err(PackageError::IndexCorrupt(format!(
                    "entry {} spans [{}, {end}) past the index at offset {index_offset}",
                    entry.name, entry.offset
                )));
            }
        }
        debug!(package = %path.display(), assets = index.len(), "opened package");
        Ok(Self {
            file: Some(file),
            index,
        })
    }

    /// The decoded index.
    pub fn index(&self) -> &PackageIndex {
        &self.index
    }

    /// Asset names in index insertion order.
    pub fn list_assets(&self) -> Vec<&str> {
        self.index.names().collect()
    }

    /// Read and decompress one asset.
    ///
    /// An unknown name is recoverable: the reader stays usable for
    /// subsequent calls.
    pub fn read_asset(&mut self, name: &str) -> Result<Vec<u8>, PackageError> {
        let (offset, length) = self
            .index
            .get(name)
            .map(|e| (e.offset, e.length))
            .ok_or_else(|| PackageError::AssetNotFound(name.to_owned()))?;
        let file = self.file.as_mut().ok_or(PackageError::Closed)?;
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut compressed = vec![0u8; length as usize];
        file.read_exact(&mut compressed)?;
        deflate::decompress(&compressed)
            .map_err(|e| PackageError::CorruptStream(format!("asset {name}: {e}")))
    }

    /// Release the file handle. Idempotent; later reads fail with
    /// [`PackageError::Closed`].
    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Incremental package writer.
///
/// Writes a placeholder header, appends compressed blobs as they are added,
/// then [`PackageWriter::finish`] appends the compressed index and
/// backpatches the header.
#[derive(Debug)]
pub struct PackageWriter {
    file: File,
    index: PackageIndex,
    cursor: u64,
}

impl PackageWriter {
    /// Create (truncating) the package file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PackageError> {
        let mut file = File::create(path.as_ref())?;
        file.write_all(&[0u8; 4])?;
        Ok(Self {
            file,
            index: PackageIndex::new(),
            cursor: HEADER_LEN,
        })
    }

    /// Compress and append one asset.
    ///
    /// The duplicate-name check runs before any bytes hit the file, so a
    /// rejected `add` leaves the package body unchanged.
    pub fn add(&mut self, name: &str, raw: &[u8]) -> Result<(), PackageError> {
        let compressed = deflate::compress(raw)?;
        let offset =
            u32::try_from(self.cursor).map_err(|_| PackageError::TooLarge(self.cursor))?;
        let length = u32::try_from(compressed.len())
            .map_err(|_| PackageError::TooLarge(compressed.len() as u64))?;
        self.index.insert(name, offset, length)?;
        self.file.write_all(&compressed)?;
        self.cursor += u64::from(length);
        debug!(asset = name, offset, length, "added asset");
        Ok(())
    }

    /// Append the compressed index and backpatch the header.
    pub fn finish(mut self) -> Result<(), PackageError> {
        let index_offset =
            u32::try_from(self.cursor).map_err(|_| PackageError::TooLarge(self.cursor))?;
        let raw = self.index.to_bytes()?;
        let compressed = deflate::compress(&raw)?;
        self.file.write_all(&compressed)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&index_offset.to_be_bytes())?;
        self.file.flush()?;
        debug!(assets = self.index.len(), index_offset, "package finished");
        Ok(())
    }
}

/// Write a complete package from an ordered set of `(name, bytes)` entries.
///
/// On any failure the partial output file is removed, so a duplicate name
/// never leaves a half-written package behind.
pub fn pack_entries<'a, I>(path: impl AsRef<Path>, entries: I) -> Result<(), PackageError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let path = path.as_ref();
    let result = (|| {
        let mut writer = PackageWriter::create(path)?;
        for (name, raw) in entries {
            writer.add(name, raw)?;
        }
        writer.finish()
    })();
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}
