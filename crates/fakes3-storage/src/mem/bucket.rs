//! Per-bucket state of the in-memory engine.
//!
//! Each key maps to its versions, newest first. The first entry is the
//! current version, which may be a delete marker. Buckets that never had
//! versioning keep exactly one `null` version per key.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::ops::Bound;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::checksums::format_etag;
use crate::error::{StorageError, StorageResult};
use crate::range::ObjectRangeRequest;
use crate::types::{
    Content, Metadata, Object, ObjectBody, ObjectDeleteResult, VersionId, VersionItem,
    VersioningConfiguration, VersioningStatus,
};

// ---------------------------------------------------------------------------
// StoredVersion
// ---------------------------------------------------------------------------

/// One immutable version of an object, or a delete marker.
#[derive(Debug, Clone)]
pub(super) struct StoredVersion {
    pub version_id: VersionId,
    pub metadata: Metadata,
    pub data: Bytes,
    pub hash: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub delete_marker: bool,
}

impl StoredVersion {
    pub fn delete_marker(version_id: VersionId, last_modified: DateTime<Utc>) -> Self {
        Self {
            version_id,
            metadata: Metadata::new(),
            data: Bytes::new(),
            hash: Vec::new(),
            last_modified,
            delete_marker: true,
        }
    }

    pub fn etag(&self) -> String {
        format_etag(&self.hash)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn content(&self, key: &str) -> Content {
        Content {
            key: key.to_owned(),
            last_modified: self.last_modified,
            etag: self.etag(),
            size: self.size(),
        }
    }

    pub fn version_item(&self, key: &str, is_latest: bool) -> VersionItem {
        VersionItem {
            key: key.to_owned(),
            version_id: self.version_id.clone(),
            is_latest,
            is_delete_marker: self.delete_marker,
            last_modified: self.last_modified,
            etag: (!self.delete_marker).then(|| self.etag()),
            size: self.size(),
        }
    }

    /// Materialize as an [`Object`]. `with_body` is false for `HEAD`.
    pub fn to_object(
        &self,
        key: &str,
        range: Option<&ObjectRangeRequest>,
        expose_version: bool,
        with_body: bool,
    ) -> StorageResult<Object> {
        let resolved = if self.delete_marker {
            None
        } else {
            range.map(|r| r.resolve(key, self.size())).transpose()?
        };

        let body = if !with_body || self.delete_marker {
            ObjectBody::empty()
        } else {
            let data = match resolved {
                Some(r) => {
                    let start = usize::try_from(r.start).unwrap_or(usize::MAX);
                    let end = usize::try_from(r.end()).unwrap_or(usize::MAX);
                    self.data.slice(start..end)
                }
                None => self.data.clone(),
            };
            ObjectBody::new(Cursor::new(data))
        };

        Ok(Object {
            name: key.to_owned(),
            metadata: self.metadata.clone(),
            size: self.size(),
            hash: self.hash.clone(),
            last_modified: self.last_modified,
            range: resolved,
            version_id: expose_version.then(|| self.version_id.clone()),
            is_delete_marker: self.delete_marker,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// MemBucket
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(super) struct MemBucket {
    pub creation_date: DateTime<Utc>,
    pub versioning: VersioningConfiguration,
    objects: BTreeMap<String, Vec<StoredVersion>>,
}

impl MemBucket {
    pub fn new(creation_date: DateTime<Utc>) -> Self {
        Self {
            creation_date,
            versioning: VersioningConfiguration::default(),
            objects: BTreeMap::new(),
        }
    }

    /// Whether version ids are surfaced to callers.
    pub fn exposes_versions(&self) -> bool {
        self.versioning.status != VersioningStatus::Unset
    }

    /// Any version or delete marker makes the bucket non-empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The current version of `key`, unless it is a delete marker.
    pub fn live(&self, key: &str) -> Option<&StoredVersion> {
        self.objects
            .get(key)
            .and_then(|versions| versions.first())
            .filter(|v| !v.delete_marker)
    }

    pub fn version(&self, key: &str, version_id: &VersionId) -> StorageResult<&StoredVersion> {
        let versions = self.objects.get(key).ok_or_else(|| StorageError::NoSuchKey {
            key: key.to_owned(),
        })?;
        versions
            .iter()
            .find(|v| v.version_id == *version_id)
            .ok_or_else(|| StorageError::NoSuchVersion {
                key: key.to_owned(),
                version_id: version_id.to_string(),
            })
    }

    /// Make `version` current. A `null` version replaces any previous
    /// `null` version of the key.
    pub fn insert(&mut self, key: &str, version: StoredVersion) {
        let versions = self.objects.entry(key.to_owned()).or_default();
        if version.version_id.is_null() {
            versions.retain(|v| !v.version_id.is_null());
        }
        versions.insert(0, version);
    }

    /// Unversioned delete. Without versioning the key is removed; otherwise a
    /// delete marker with `marker_id` becomes current.
    pub fn delete(
        &mut self,
        key: &str,
        marker_id: VersionId,
        now: DateTime<Utc>,
    ) -> ObjectDeleteResult {
        if !self.exposes_versions() {
            self.objects.remove(key);
            return ObjectDeleteResult::default();
        }
        self.insert(key, StoredVersion::delete_marker(marker_id.clone(), now));
        ObjectDeleteResult {
            is_delete_marker: true,
            version_id: Some(marker_id),
        }
    }

    /// Remove exactly one version. Absent versions are ignored.
    pub fn delete_version(&mut self, key: &str, version_id: &VersionId) -> ObjectDeleteResult {
        let mut result = ObjectDeleteResult {
            is_delete_marker: false,
            version_id: Some(version_id.clone()),
        };
        let Some(versions) = self.objects.get_mut(key) else {
            return result;
        };
        if let Some(pos) = versions.iter().position(|v| v.version_id == *version_id) {
            result.is_delete_marker = versions.remove(pos).delete_marker;
        }
        if versions.is_empty() {
            self.objects.remove(key);
        }
        result
    }

    /// Keys strictly after `marker` (or all keys), in order.
    pub fn keys_after<'a>(
        &'a self,
        marker: Option<&'a str>,
        inclusive: bool,
    ) -> impl Iterator<Item = (&'a String, &'a Vec<StoredVersion>)> + 'a {
        let lower = match marker {
            Some(m) if inclusive => Bound::Included(m),
            Some(m) => Bound::Excluded(m),
            None => Bound::Unbounded,
        };
        self.objects
            .range::<str, _>((lower, Bound::Unbounded))
    }
}
