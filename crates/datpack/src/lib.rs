//! datpack - codec for the single-file asset package container.
//!
//! A package bundles many named assets (text, images, audio, fonts, vector
//! graphics) into one compressed blob:
//!
//! ```text
//! [0, 4)               big-endian u32: offset of the compressed index
//! [4, index_offset)    raw-deflate blobs, one per asset
//! [index_offset, EOF)  raw-deflate AMF3 index: name -> [offset, length]
//! ```
//!
//! # Modules
//!
//! - [`deflate`]: headerless DEFLATE framing for blobs and the index.
//! - [`amf3`]: the compact binary object-graph encoding of the index, with
//!   reference-table deduplication of strings and object instances.
//! - [`index`]: the decoded name-to-byte-range mapping.
//! - [`package`]: [`PackageReader`] / [`PackageWriter`] over the layout above.
//! - [`classify`]: extension-based category labels for export grouping.
//!
//! Everything is single-threaded and synchronous; callers needing exclusive
//! access across processes must arrange locking themselves.

pub mod amf3;
pub mod classify;
pub mod deflate;
pub mod index;
pub mod package;

// Re-exports for convenience
pub use classify::{AssetKind, classify};
pub use index::{IndexEntry, IndexError, PackageIndex};
pub use package::{PackageError, PackageReader, PackageWriter, pack_entries};
