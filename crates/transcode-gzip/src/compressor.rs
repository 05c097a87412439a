//! Core gzip functionality

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// The `Content-Encoding` value for gzip
pub const GZIP_ENCODING: &str = "gzip";

/// Gzip compressor for whole bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor;

impl Compressor {
    /// Map a configured level onto a flate2 compression level
    pub fn level(level: u32) -> Compression {
        Compression::new(level.min(9))
    }

    /// Compress data using gzip
    pub fn compress(data: &[u8], level: u32) -> io::Result<Bytes> {
        let mut encoder = GzEncoder::new(Vec::new(), Self::level(level));
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        Ok(Bytes::from(compressed))
    }

    /// Fully drain a gzip stream into memory
    ///
    /// Every member of a multi-member stream is decoded. Fails if the stream
    /// is not valid gzip or the reader fails.
    pub fn decompress<R: Read>(reader: R) -> io::Result<Bytes> {
        let mut decoder = MultiGzDecoder::new(reader);
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compress_gzip() {
        let data = "Hello, World! This is a test string that should compress well. ".repeat(100);
        let compressed = Compressor::compress(data.as_bytes(), 6).unwrap();
        assert!(compressed.len() < data.len());
        // gzip magic
        assert_eq!(compressed[..2], [0x1f_u8, 0x8b]);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(Compressor::decompress(&b"definitely not gzip"[..]).is_err());
    }

    #[test]
    fn test_decompress_truncated() {
        let compressed = Compressor::compress(b"some body that gets cut off", 6).unwrap();
        let truncated = &compressed[..compressed.len() - 6];
        assert!(Compressor::decompress(truncated).is_err());
    }

    #[test]
    fn test_decompress_concatenated_members() {
        let mut stream = Compressor::compress(b"first member, ", 6).unwrap().to_vec();
        stream.extend_from_slice(&Compressor::compress(b"second member", 1).unwrap());

        let restored = Compressor::decompress(stream.as_slice()).unwrap();
        assert_eq!(restored.as_ref(), b"first member, second member");
    }

    #[test]
    fn test_decompress_truncated_second_member() {
        let mut stream = Compressor::compress(b"complete", 6).unwrap().to_vec();
        let second = Compressor::compress(b"cut short", 6).unwrap();
        stream.extend_from_slice(&second[..second.len() - 6]);

        assert!(Compressor::decompress(stream.as_slice()).is_err());
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(Compressor::level(42).level(), 9);
        assert_eq!(Compressor::level(0).level(), 0);
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096), level in 0u32..=9) {
            let compressed = Compressor::compress(&data, level).unwrap();
            let restored = Compressor::decompress(&compressed[..]).unwrap();
            prop_assert_eq!(restored.as_ref(), data.as_slice());
        }
    }
}
