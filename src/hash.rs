//! SHA-256 file digests
//!
//! Files are read in fixed 4 KiB blocks so memory use does not grow with the
//! file. The same digest serves as the pre-flight skip check and as the
//! post-transfer acceptance gate.

use crate::error::{FetchError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read block size for hashing (4 KiB)
pub const HASH_BLOCK_SIZE: usize = 4096;

/// Lowercase hex SHA-256 of a file.
///
/// # Example
/// ```ignore
/// let hex = digest(Path::new("third_party/libraries.7z"))?;
/// ```
pub fn digest(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| FetchError::io("open", path, e))?;
    digest_reader(file).map_err(|e| FetchError::io("read", path, e))
}

/// Lowercase hex SHA-256 of everything a reader yields.
pub fn digest_reader(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BLOCK_SIZE];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file at `path` exists and hashes to `expected`.
///
/// A missing file is `Ok(false)`; any other read failure is an error.
pub fn matches(path: &Path, expected: &str) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    Ok(digest(path)? == normalize(expected))
}

/// Fail with [`FetchError::Validation`] unless `path` hashes to `expected`.
pub fn verify(path: &Path, expected: &str) -> Result<()> {
    let actual = digest(path)?;
    let expected = normalize(expected);
    if actual != expected {
        return Err(FetchError::Validation {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Expected digests are compared case-insensitively.
fn normalize(expected: &str) -> String {
    expected.trim().to_ascii_lowercase()
}
