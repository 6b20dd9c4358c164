//! Domain values exchanged between the protocol layer and the engines.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::range::ObjectRange;

/// User metadata attached to an object.
pub type Metadata = HashMap<String, String>;

// ---------------------------------------------------------------------------
// VersionId
// ---------------------------------------------------------------------------

/// Opaque version identifier.
///
/// Ids issued by a [`crate::version_id::VersionGenerator`] sort in issue
/// order. [`VersionId::null`] is the sentinel carried by objects written while
/// versioning is unset or suspended; it renders as `null`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    const NULL: &'static str = "null";

    /// Wrap an id string as received from a client.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `null` version.
    #[must_use]
    pub fn null() -> Self {
        Self(Self::NULL.to_owned())
    }

    /// Whether this is the `null` version.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL
    }

    /// Borrow the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// A bucket as reported by `ListBuckets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
}

/// Versioning state of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Never configured. Writes replace the single `null` version.
    #[default]
    Unset,
    /// Every write creates a new version.
    Enabled,
    /// Writes replace the `null` version; older versions stay.
    Suspended,
}

/// MFA-delete state of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaDeleteStatus {
    /// Never configured.
    #[default]
    Unset,
    /// Explicitly disabled.
    Disabled,
    /// Requires MFA for version deletes; not supported.
    Enabled,
}

/// Bucket versioning configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfiguration {
    /// Versioning state.
    pub status: VersioningStatus,
    /// MFA-delete state.
    pub mfa_delete: MfaDeleteStatus,
}

impl VersioningConfiguration {
    /// Configuration with versioning enabled.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            status: VersioningStatus::Enabled,
            mfa_delete: MfaDeleteStatus::Unset,
        }
    }

    /// Configuration with versioning suspended.
    #[must_use]
    pub fn suspended() -> Self {
        Self {
            status: VersioningStatus::Suspended,
            mfa_delete: MfaDeleteStatus::Unset,
        }
    }

    /// Whether new writes get a fresh version id.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.status == VersioningStatus::Enabled
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Payload reader of an [`Object`].
pub struct ObjectBody(Box<dyn Read + Send>);

impl ObjectBody {
    /// Wrap a reader.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Box::new(reader))
    }

    /// A body that yields nothing, used by `HeadObject`.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(io::empty())
    }

    /// Read the whole body into memory.
    pub fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.0.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for ObjectBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectBody")
    }
}

/// An object returned by `GetObject` or `HeadObject`.
#[derive(Debug)]
pub struct Object {
    /// Object key.
    pub name: String,
    /// User metadata.
    pub metadata: Metadata,
    /// Full size of the object, regardless of the range served.
    pub size: u64,
    /// Raw MD5 digest of the full object.
    pub hash: Vec<u8>,
    /// When the object was written.
    pub last_modified: DateTime<Utc>,
    /// The byte range served by `body`, if a range was requested.
    pub range: Option<ObjectRange>,
    /// Version of this object; `None` for engines without versioning.
    pub version_id: Option<VersionId>,
    /// Whether this is a delete marker (only from versioned reads).
    pub is_delete_marker: bool,
    /// Payload.
    pub body: ObjectBody,
}

impl Object {
    /// Quoted hex ETag of the object.
    #[must_use]
    pub fn etag(&self) -> String {
        crate::checksums::format_etag(&self.hash)
    }

    /// Number of bytes `body` yields.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.size, |r| r.length)
    }
}

/// One entry in the `Contents` of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    /// Object key.
    pub key: String,
    /// When the object was written.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
}

/// Result of `ListBucket`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectList {
    /// Matching objects.
    pub contents: Vec<Content>,
    /// Synthetic directories produced by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Whether more entries exist past this page.
    pub is_truncated: bool,
    /// Marker to pass for the next page.
    pub next_marker: Option<String>,
}

impl ObjectList {
    /// Append an object.
    pub fn add(&mut self, content: Content) {
        self.contents.push(content);
    }

    /// Append a common prefix unless it is already present. Returns whether
    /// it was new.
    pub fn add_prefix(&mut self, prefix: String) -> bool {
        if self.common_prefixes.iter().any(|p| *p == prefix) {
            return false;
        }
        self.common_prefixes.push(prefix);
        true
    }

    /// Number of entries (contents plus common prefixes).
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len() + self.common_prefixes.len()
    }

    /// Whether the listing holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry in a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionItem {
    /// Object key.
    pub key: String,
    /// Version id (`null` for unversioned writes).
    pub version_id: VersionId,
    /// Whether this is the current version of its key.
    pub is_latest: bool,
    /// Whether this entry is a delete marker.
    pub is_delete_marker: bool,
    /// When the version was written.
    pub last_modified: DateTime<Utc>,
    /// Quoted ETag; `None` for delete markers.
    pub etag: Option<String>,
    /// Size in bytes; zero for delete markers.
    pub size: u64,
}

/// Result of `ListBucketVersions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListBucketVersionsResult {
    /// Versions and delete markers, by key then newest first.
    pub versions: Vec<VersionItem>,
    /// Synthetic directories produced by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Whether more entries exist past this page.
    pub is_truncated: bool,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Version-id marker for the next page.
    pub next_version_id_marker: Option<VersionId>,
}

// ---------------------------------------------------------------------------
// Write / delete results
// ---------------------------------------------------------------------------

/// Result of `PutObject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectResult {
    /// Version created, when the bucket is versioned.
    pub version_id: Option<VersionId>,
    /// Quoted ETag of the stored bytes.
    pub etag: String,
}

/// Result of `DeleteObject` and `DeleteObjectVersion`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDeleteResult {
    /// Whether the delete created or removed a delete marker.
    pub is_delete_marker: bool,
    /// The version created (marker) or removed.
    pub version_id: Option<VersionId>,
}

/// A (key, version) pair addressed by a multi-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId {
    /// Object key.
    pub key: String,
    /// Specific version, if any.
    pub version_id: Option<VersionId>,
}

impl ObjectId {
    /// Address the current version of `key`.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    /// Address one version of `key`.
    pub fn version(key: impl Into<String>, version_id: VersionId) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id),
        }
    }
}

/// Successful entry of a multi-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedObject {
    /// Object key.
    pub key: String,
    /// Version removed, if one was addressed.
    pub version_id: Option<VersionId>,
    /// Whether a delete marker was involved.
    pub delete_marker: bool,
    /// Version id of the delete marker, if one was created.
    pub delete_marker_version_id: Option<VersionId>,
}

/// Failed entry of a multi-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    /// Object key.
    pub key: String,
    /// Version addressed, if any.
    pub version_id: Option<VersionId>,
    /// S3 error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// Result of `DeleteMulti`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiDeleteResult {
    /// Keys that were deleted.
    pub deleted: Vec<DeletedObject>,
    /// Keys that failed.
    pub errors: Vec<DeleteError>,
}

impl MultiDeleteResult {
    /// Record a failure for `key`.
    pub fn push_error(
        &mut self,
        key: &str,
        version_id: Option<VersionId>,
        err: &crate::error::StorageError,
    ) {
        self.errors.push(DeleteError {
            key: key.to_owned(),
            version_id,
            code: err.code().to_owned(),
            message: err.to_string(),
        });
    }
}
