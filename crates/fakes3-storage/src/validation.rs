//! Request validation: bucket names, object keys and metadata size.
//!
//! Bucket naming follows the
//! [Amazon S3 rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html).

use std::net::Ipv4Addr;

use crate::error::{StorageError, StorageResult};
use crate::types::Metadata;

/// Maximum object key length in bytes.
pub const MAX_KEY_BYTES: usize = 1024;

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Validate an S3 bucket name.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and dots
/// - Must start and end with a letter or number
/// - No consecutive dots (`..`)
/// - Not formatted as an IPv4 address (e.g. `192.168.0.1`)
/// - Must not start with `xn--` or `sthree-`, nor end with `-s3alias`
///
/// # Examples
///
/// ```
/// use fakes3_storage::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// assert!(validate_bucket_name("_meta").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidBucketName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        })
    };

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
        return reject("Bucket name must be between 3 and 63 characters long");
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return reject("Bucket name must only contain lowercase letters, numbers, hyphens, and dots");
    }

    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return reject("Bucket name must start and end with a letter or number");
    }

    if name.contains("..") {
        return reject("Bucket name must not contain consecutive dots");
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return reject("Bucket name must not be formatted as an IP address");
    }

    if name.starts_with("xn--") || name.starts_with("sthree-") {
        return reject("Bucket name must not start with a reserved prefix");
    }

    if name.ends_with("-s3alias") {
        return reject("Bucket name must not end with '-s3alias'");
    }

    Ok(())
}

/// Validate an object key: 1-1024 bytes.
///
/// ```
/// use fakes3_storage::validation::validate_object_key;
///
/// assert!(validate_object_key("photos/2024/image.jpg").is_ok());
/// assert!(validate_object_key("").is_err());
/// ```
pub fn validate_object_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_argument(
            "key",
            "Object key must not be empty",
        ));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::KeyTooLong { size: key.len() });
    }
    Ok(())
}

/// Summed byte length of metadata keys and values.
#[must_use]
pub fn metadata_size(metadata: &Metadata) -> usize {
    metadata.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Reject metadata whose summed size exceeds `limit`. A limit of zero
/// disables the check.
pub fn validate_metadata_size(key: &str, metadata: &Metadata, limit: usize) -> StorageResult<()> {
    if limit > 0 && metadata_size(metadata) > limit {
        return Err(StorageError::MetadataTooLarge { key: key.to_owned() });
    }
    Ok(())
}
