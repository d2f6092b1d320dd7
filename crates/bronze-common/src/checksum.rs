//! Content digests computed incrementally over chunk streams
//!
//! Transfers hash the bytes as they flow from the remote source to storage,
//! so the digest is never computed by reading the object back.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Incremental digest fed one chunk at a time.
pub struct StreamingDigest {
    hasher: Hasher,
    bytes: u64,
}

impl StreamingDigest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        let hasher = match algorithm {
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        };
        Self { hasher, bytes: 0 }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        match &mut self.hasher {
            Hasher::Sha256(h) => h.update(chunk),
            Hasher::Sha512(h) => h.update(chunk),
        }
    }

    /// Number of bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consume the digest and return the lowercase hex string
    pub fn finalize(self) -> String {
        match self.hasher {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Compute checksum for any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut digest = StreamingDigest::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        digest.update(&buffer[..bytes_read]);
    }

    Ok(digest.finalize())
}

/// Compare a computed digest against the value the caller expected.
///
/// Comparison ignores hex case.
pub fn verify_checksum(expected: &str, actual: &str) -> Result<()> {
    if expected.trim().eq_ignore_ascii_case(actual.trim()) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_compute_checksum_sha256() {
        let mut cursor = Cursor::new(b"hello world");
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(checksum, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_compute_checksum_sha512() {
        let mut cursor = Cursor::new(b"hello world");
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Sha512).unwrap();
        assert_eq!(
            checksum,
            "309ecc489c12d6eb4cc40f50c902f2b4d0ed77ee511a7c7a9bcd3ca86d4cd86f989dd35bc5ff499670da34255b45b0cfd830e81f605dcf7dc5542e93ae9cd76f"
        );
    }

    #[test]
    fn test_streaming_digest_counts_bytes() {
        let mut digest = StreamingDigest::new(ChecksumAlgorithm::Sha256);
        digest.update(b"hello ");
        digest.update(b"world");
        assert_eq!(digest.bytes(), 11);
        assert_eq!(
            digest.finalize(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        assert!(verify_checksum("ABCDEF", "abcdef").is_ok());
        let err = verify_checksum("abc", "def").unwrap_err();
        assert!(matches!(err, CommonError::ChecksumMismatch { .. }));
    }

    proptest! {
        #[test]
        fn chunked_digest_matches_single_pass(data in proptest::collection::vec(any::<u8>(), 0..4096), split in 1usize..512) {
            let mut chunked = StreamingDigest::new(ChecksumAlgorithm::Sha256);
            for chunk in data.chunks(split) {
                chunked.update(chunk);
            }
            let single = compute_checksum(&mut Cursor::new(&data), ChecksumAlgorithm::Sha256).unwrap();
            prop_assert_eq!(chunked.finalize(), single);
        }
    }
}
