//! Raw (headerless) DEFLATE framing.
//!
//! Every stored blob and the index itself are compressed with bare DEFLATE:
//! no zlib or gzip header, no trailing checksum. The reference client rejects
//! wrapped streams, so `flate2`'s `Deflate` types are used rather than the
//! `Zlib`/`Gz` ones.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

/// Compress a buffer as a raw deflate stream at level 9.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(
        Vec::with_capacity(data.len() / 2 + 16),
        Compression::best(),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a raw deflate stream.
///
/// Fails with `io::ErrorKind::InvalidInput`-class errors when `data` is not
/// a valid stream; callers at the package boundary map that to their
/// corrupt-stream error.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for data in [
            &b""[..],
            b"hello",
            b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            &[0u8, 1, 2, 3, 255, 254, 253, 252],
        ] {
            let compressed = compress(data).unwrap();
            assert_eq!(decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_roundtrip_large_buffer() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_no_zlib_header() {
        let compressed = compress(b"hello world").unwrap();
        // 0x78 is the zlib CMF byte; a raw stream must not start with it.
        assert_ne!(compressed[0], 0x78);
    }

    #[test]
    fn test_decompress_reference_stream() {
        // zlib.compress(b"hello") with header and adler32 stripped.
        let raw = [0xCB, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00];
        assert_eq!(decompress(&raw).unwrap(), b"hello");
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        // BTYPE=11 is reserved, so this can never be a valid stream.
        assert!(decompress(&[0xFF; 16]).is_err());
    }
}
