//! Lossless compression of artifact bytes.

use std::io::Cursor;

use brotli::enc::BrotliEncoderParams;

use crate::CeremonyError;

/// Highest brotli quality level, used when nothing else is configured.
pub const DEFAULT_COMPRESSION_QUALITY: u32 = 11;
pub const MAX_COMPRESSION_QUALITY: u32 = 11;
/// Extension appended to compressed companions (`zkey` -> `zkey.br`).
pub const COMPRESSED_EXTENSION: &str = "br";

const BROTLI_WINDOW_BITS: i32 = 22;

/// Compression collaborator. Output must decompress to the exact input.
pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8], quality: u32) -> Result<Vec<u8>, CeremonyError>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CeremonyError>;

    /// Compress and refuse output that does not decompress byte-identically.
    fn compress_verified(&self, data: &[u8], quality: u32) -> Result<Vec<u8>, CeremonyError> {
        let compressed = self.compress(data, quality)?;
        if self.decompress(&compressed)? != data {
            return Err(CeremonyError::Compression(
                "compressed output does not round-trip".into(),
            ));
        }
        Ok(compressed)
    }
}

/// Brotli codec with the default 22-bit window.
#[derive(Clone, Copy, Debug, Default)]
pub struct Brotli;

impl Codec for Brotli {
    fn compress(&self, data: &[u8], quality: u32) -> Result<Vec<u8>, CeremonyError> {
        validate_quality(quality)?;
        let params = BrotliEncoderParams {
            quality: quality as i32,
            lgwin: BROTLI_WINDOW_BITS,
            ..Default::default()
        };
        let mut out = Vec::with_capacity(data.len() / 2);
        brotli::BrotliCompress(&mut Cursor::new(data), &mut out, &params)
            .map_err(|err| CeremonyError::Compression(format!("brotli encode failed: {err}")))?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CeremonyError> {
        let mut out = Vec::with_capacity(data.len() * 2);
        brotli::BrotliDecompress(&mut Cursor::new(data), &mut out)
            .map_err(|err| CeremonyError::Compression(format!("brotli decode failed: {err}")))?;
        Ok(out)
    }
}

pub fn validate_quality(quality: u32) -> Result<u32, CeremonyError> {
    if quality > MAX_COMPRESSION_QUALITY {
        return Err(CeremonyError::InvalidInput(format!(
            "compression quality {quality} is out of range 0..={MAX_COMPRESSION_QUALITY}"
        )));
    }
    Ok(quality)
}

/// File name of the compressed companion of `name`.
pub fn compressed_name(name: &str) -> String {
    format!("{name}.{COMPRESSED_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn samples() -> Vec<Vec<u8>> {
        vec![
            Vec::new(),
            b"zkey".to_vec(),
            vec![0u8; 64 * 1024],
            (0..200_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect(),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip_any_quality(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            quality in 0..=MAX_COMPRESSION_QUALITY,
        ) {
            let compressed = Brotli.compress_verified(&data, quality).unwrap();
            prop_assert_eq!(Brotli.decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn round_trip_large_samples() {
        for sample in samples() {
            let compressed = Brotli.compress(&sample, DEFAULT_COMPRESSION_QUALITY).unwrap();
            assert_eq!(Brotli.decompress(&compressed).unwrap(), sample);
        }
    }

    #[test]
    fn compression_is_deterministic() {
        let data = samples().pop().unwrap();
        let first = Brotli.compress(&data, 9).unwrap();
        let second = Brotli.compress(&data, 9).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn compress_verified_accepts_good_codec() {
        let data = vec![7u8; 4096];
        let compressed = Brotli.compress_verified(&data, 4).unwrap();
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn compress_verified_rejects_lossy_codec() {
        struct Truncating;
        impl Codec for Truncating {
            fn compress(&self, data: &[u8], _: u32) -> Result<Vec<u8>, CeremonyError> {
                Ok(data[..data.len() / 2].to_vec())
            }
            fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CeremonyError> {
                Ok(data.to_vec())
            }
        }
        assert!(matches!(
            Truncating.compress_verified(b"abcdef", 1),
            Err(CeremonyError::Compression(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(matches!(
            Brotli.compress(b"x", 12),
            Err(CeremonyError::InvalidInput(_))
        ));
        assert_eq!(validate_quality(0).unwrap(), 0);
    }

    #[test]
    fn truncated_stream_does_not_decompress() {
        let data = samples().pop().unwrap();
        let compressed = Brotli.compress(&data, 5).unwrap();
        assert!(Brotli.decompress(&compressed[..compressed.len() / 2]).is_err());
    }

    #[test]
    fn compressed_names() {
        assert_eq!(compressed_name("zkey"), "zkey.br");
    }
}
