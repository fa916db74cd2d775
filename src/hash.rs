// src/hash.rs

//! SHA-256 content hashing for sources and installed files
//!
//! Digests are streamed through the hasher; files are never read whole
//! into memory.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Raw SHA-256 digest
pub type Hash = [u8; 32];

/// Outcome of comparing a file against an expected digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }
}

/// Stream a reader through SHA-256
pub fn digest<R: Read>(mut reader: R) -> io::Result<Hash> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

/// Lower-case hex SHA-256 of a file's contents
pub fn digest_hex(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        Error::IoError(format!("Failed to open {} for hashing: {}", path.display(), e))
    })?;

    let hash = digest(file).map_err(|e| {
        Error::IoError(format!("Failed to read {} for hashing: {}", path.display(), e))
    })?;

    Ok(to_hex(&hash))
}

/// Compare a file's digest against an expected hex string
///
/// A mismatch is a normal result, not an error; only an unreadable file fails.
pub fn verify(path: &Path, expected: &str) -> Result<Verification> {
    debug!("Verifying checksum for {}", path.display());

    let actual = digest_hex(path)?;
    let expected = expected.trim();

    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified: {}", actual);
        Ok(Verification::Match)
    } else {
        Ok(Verification::Mismatch {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

/// Hex-encode a digest
pub fn to_hex(hash: &Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_digest_hex_of_empty_file() {
        let file = file_with(b"");
        assert_eq!(digest_hex(file.path()).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn test_digest_hex_of_known_content() {
        let file = file_with(b"abc");
        assert_eq!(digest_hex(file.path()).unwrap(), ABC_SHA256);
    }

    #[test]
    fn test_digest_streams_large_input() {
        let data = vec![0x5au8; 3 * 1024 * 1024 + 7];
        let streamed = digest(&data[..]).unwrap();
        let direct = Sha256::digest(&data);
        assert_eq!(&streamed[..], &direct[..]);
    }

    #[test]
    fn test_verify_match_is_case_insensitive() {
        let file = file_with(b"abc");
        let result = verify(file.path(), &ABC_SHA256.to_uppercase()).unwrap();
        assert!(result.is_match());
    }

    #[test]
    fn test_verify_reports_mismatch() {
        let file = file_with(b"abd");
        match verify(file.path(), ABC_SHA256).unwrap() {
            Verification::Mismatch { expected, actual } => {
                assert_eq!(expected, ABC_SHA256);
                assert_ne!(actual, ABC_SHA256);
            }
            Verification::Match => panic!("expected a mismatch"),
        }
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = digest_hex(&dir.path().join("missing"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    proptest! {
        #[test]
        fn prop_digest_hex_matches_sha256_of_written_bytes(
            content in prop::collection::vec(any::<u8>(), 0..4096),
        ) {
            let file = file_with(&content);
            let independent: Hash = Sha256::digest(&content).into();
            prop_assert_eq!(digest_hex(file.path()).unwrap(), to_hex(&independent));
        }
    }
}
