//! Digest helpers: MD5 ETags, SHA-256 chunk addresses and Content-MD5
//! verification.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use md5::Md5;
use sha2::Sha256;

use crate::error::{StorageError, StorageResult, internal};

/// Compute the raw MD5 digest of `data`.
#[must_use]
pub fn md5_digest(data: &[u8]) -> Vec<u8> {
    Md5::digest(data).to_vec()
}

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use fakes3_storage::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Compute the quoted ETag of `data`.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Render a raw MD5 digest as a quoted ETag.
#[must_use]
pub fn format_etag(hash: &[u8]) -> String {
    format!("\"{}\"", hex::encode(hash))
}

/// Hex SHA-256 of `data`, the address of a stored chunk.
#[must_use]
pub fn compute_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Strip surrounding double quotes from an ETag, if present.
#[must_use]
pub fn normalize_etag(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(etag)
}

/// Decode a base64 `Content-MD5` value.
///
/// Anything that is not 16 bytes of valid base64 is `InvalidDigest`.
pub fn decode_content_md5(key: &str, value: &str) -> StorageResult<Vec<u8>> {
    let decoded = BASE64_STANDARD
        .decode(value.trim())
        .map_err(|_| StorageError::InvalidDigest { key: key.to_owned() })?;
    if decoded.len() != 16 {
        return Err(StorageError::InvalidDigest { key: key.to_owned() });
    }
    Ok(decoded)
}

/// Check `data` against a base64 `Content-MD5` value.
pub fn verify_content_md5(key: &str, data: &[u8], expected: &str) -> StorageResult<()> {
    let expected = decode_content_md5(key, expected)?;
    if md5_digest(data) != expected {
        return Err(StorageError::BadDigest { key: key.to_owned() });
    }
    Ok(())
}

/// Largest buffer reserved up front for a body of declared size.
pub const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// Initial capacity for a buffer expected to hold `size` bytes. Declared
/// sizes are not trusted beyond [`MAX_PREALLOCATION`].
#[must_use]
pub fn preallocation(size: u64) -> usize {
    usize::try_from(size).map_or(MAX_PREALLOCATION, |n| n.min(MAX_PREALLOCATION))
}

/// Read exactly `size` bytes from `input`.
///
/// A body shorter than declared is `IncompleteBody`; bytes past `size` are
/// left unread.
pub fn read_exact_size(key: &str, input: &mut dyn Read, size: u64) -> StorageResult<Vec<u8>> {
    if usize::try_from(size).is_err() {
        return Err(StorageError::invalid_argument(
            key,
            format!("object size {size} is too large"),
        ));
    }
    let mut buf = Vec::with_capacity(preallocation(size));
    input
        .take(size)
        .read_to_end(&mut buf)
        .map_err(internal("reading request body"))?;
    if buf.len() as u64 != size {
        return Err(StorageError::IncompleteBody { key: key.to_owned() });
    }
    Ok(buf)
}
