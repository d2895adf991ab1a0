//! SHA-256 helpers for content-addressed metadata.
//!
//! Hashes are lowercase hexadecimal strings, the same encoding the upstream
//! repository uses inside its `{"sha256": ...}` entries.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{MirrorError, MirrorResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Calculate the SHA-256 of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> MirrorResult<String> {
    let mut file = File::open(path).map_err(|e| MirrorError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| MirrorError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare two digests, ignoring hex case.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_hex_known_value() {
        // SHA-256 of "hello world"
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_calculate_file_checksum_matches_buffer() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("packages.json");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        let checksum = calculate_file_checksum(&file_path).unwrap();
        assert_eq!(checksum, sha256_hex(b"hello world"));
    }

    #[test]
    fn test_calculate_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.json");
        File::create(&file_path).unwrap();

        assert_eq!(
            calculate_file_checksum(&file_path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_calculate_nonexistent_file() {
        let result = calculate_file_checksum(Path::new("/nonexistent/packages.json"));
        assert!(matches!(result, Err(MirrorError::ReadFailed { .. })));
    }

    #[test]
    fn test_large_file_spans_buffers() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.json");
        let data = vec![0xABu8; 100_000];
        File::create(&file_path).unwrap().write_all(&data).unwrap();

        assert_eq!(calculate_file_checksum(&file_path).unwrap(), sha256_hex(&data));
    }

    #[test]
    fn test_digests_match_ignores_case() {
        assert!(digests_match("ABCDEF01", "abcdef01"));
        assert!(!digests_match("abcdef01", "abcdef02"));
    }
}
