// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hashing and compression primitives shared by the control-file and release-index code.

Everything here operates on buffers already held in memory: the gateway never deals with
an archive or index larger than a few hundred KiB, so a bounded `Vec<u8>` in, a bounded
`Vec<u8>` out is all that's needed -- no async streaming readers.
*/

use {
    crate::error::{DebianError, Result},
    sha2::{Digest, Sha256},
    std::io::Read,
};

/// A SHA-256 content digest.
///
/// Repository indices only ever need SHA-256 here, so the type models that one flavor
/// rather than a family of digest algorithms.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentDigest(Vec<u8>);

impl ContentDigest {
    /// Compute the digest of a buffer.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().to_vec())
    }

    /// Parse a digest from a lowercase hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Ok(Self(hex::decode(hex_str)?))
    }

    /// Obtain the lowercase hex encoding of this digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The `Release` field name this digest's rows are filed under.
    pub fn release_field_name(&self) -> &'static str {
        "SHA256"
    }
}

/// Compute the lowercase hex SHA-256 digest of a buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    ContentDigest::from_bytes(data).digest_hex()
}

/// Compression formats the extractor and index generator deal in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Infer the compression of a deb control archive member from its AR member name suffix.
    ///
    /// `control.tar` (no suffix) is uncompressed.
    pub fn from_control_tar_suffix(name: &str) -> Result<Self> {
        if name == "control.tar" {
            Ok(Self::None)
        } else if let Some(suffix) = name.strip_prefix("control.tar.") {
            match suffix {
                "gz" => Ok(Self::Gzip),
                "xz" => Ok(Self::Xz),
                "zst" => Ok(Self::Zstd),
                other => Err(DebianError::UnsupportedCodec(other.to_string())),
            }
        } else {
            Err(DebianError::UnsupportedCodec(name.to_string()))
        }
    }
}

/// Decompress `data`, refusing to produce more than `cap` bytes.
///
/// This is the compression-bomb guard called out in the design notes: untrusted upstream
/// content is decompressed into a bounded buffer and nothing more.
pub fn decompress_bounded(data: &[u8], compression: Compression, cap: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    match compression {
        Compression::None => {
            out.extend_from_slice(data);
        }
        Compression::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(data);
            decoder.by_ref().take(cap as u64 + 1).read_to_end(&mut out)?;
        }
        Compression::Xz => {
            let mut decoder = xz2::read::XzDecoder::new(data);
            decoder.by_ref().take(cap as u64 + 1).read_to_end(&mut out)?;
        }
        Compression::Zstd => {
            let mut decoder = zstd::stream::read::Decoder::new(data)?;
            decoder.by_ref().take(cap as u64 + 1).read_to_end(&mut out)?;
        }
    }

    if out.len() > cap {
        return Err(DebianError::CorruptArchive(format!(
            "decompressed content exceeds {} byte cap",
            cap
        )));
    }

    Ok(out)
}

/// Gzip-compress a buffer at the default compression level.
///
/// Output begins with the gzip magic `1F 8B`.
pub fn gzip_compress(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .expect("writing to an in-memory encoder cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vectors() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(sha256_hex(b"hello").len(), 64);
    }

    #[test]
    fn gzip_roundtrip() {
        let data = b"hello, gateway";
        let compressed = gzip_compress(data);
        assert_eq!(&compressed[0..2], &[0x1f, 0x8b]);

        let decompressed =
            decompress_bounded(&compressed, Compression::Gzip, 1024 * 1024).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn decompress_bounded_rejects_oversized_output() {
        let data = vec![b'a'; 4096];
        let compressed = gzip_compress(&data);
        let result = decompress_bounded(&compressed, Compression::Gzip, 8);
        assert!(result.is_err());
    }

    #[test]
    fn control_tar_suffix_inference() {
        assert_eq!(
            Compression::from_control_tar_suffix("control.tar").unwrap(),
            Compression::None
        );
        assert_eq!(
            Compression::from_control_tar_suffix("control.tar.gz").unwrap(),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_control_tar_suffix("control.tar.xz").unwrap(),
            Compression::Xz
        );
        assert_eq!(
            Compression::from_control_tar_suffix("control.tar.zst").unwrap(),
            Compression::Zstd
        );
        assert!(Compression::from_control_tar_suffix("control.tar.lz4").is_err());
    }
}
