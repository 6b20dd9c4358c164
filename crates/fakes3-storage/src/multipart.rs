//! Multipart upload coordination.
//!
//! [`Uploader`] keeps in-flight uploads and their part payloads in memory and
//! is what the in-memory engine delegates to. The completion rules in
//! [`validate_completion`] and the listing helpers are shared with engines
//! that persist parts themselves.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fakes3_core::TimeSource;
use parking_lot::Mutex;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksums::{compute_etag, normalize_etag, preallocation, read_exact_size};
use crate::error::{StorageError, StorageResult};
use crate::prefix::Prefix;
use crate::types::Metadata;

/// Highest part number S3 accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

// ---------------------------------------------------------------------------
// Upload records
// ---------------------------------------------------------------------------

/// An in-progress multipart upload whose parts carry a payload of type `P`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload<P> {
    /// Unique identifier for this upload.
    pub upload_id: String,
    /// Bucket the object will be written to.
    pub bucket: String,
    /// The object key that this upload will create.
    pub key: String,
    /// Metadata applied to the final object.
    pub metadata: Metadata,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
    /// Parts uploaded so far, keyed by part number.
    pub parts: BTreeMap<u32, UploadPart<P>>,
}

impl<P> MultipartUpload<P> {
    /// Create an upload with no parts.
    #[must_use]
    pub fn new(
        upload_id: String,
        bucket: &str,
        key: &str,
        metadata: Metadata,
        initiated: DateTime<Utc>,
    ) -> Self {
        Self {
            upload_id,
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            metadata,
            initiated,
            parts: BTreeMap::new(),
        }
    }

    /// Whether this upload was started for (`bucket`, `key`).
    #[must_use]
    pub fn belongs_to(&self, bucket: &str, key: &str) -> bool {
        self.bucket == bucket && self.key == key
    }

    /// Summary used in listings.
    #[must_use]
    pub fn info(&self) -> MultipartUploadInfo {
        MultipartUploadInfo {
            upload_id: self.upload_id.clone(),
            key: self.key.clone(),
            initiated: self.initiated,
        }
    }
}

/// One stored part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart<P> {
    /// Quoted hex MD5 of the part payload.
    pub etag: String,
    /// Size of this part in bytes.
    pub size: u64,
    /// When this part was uploaded.
    pub last_modified: DateTime<Utc>,
    /// The payload or a reference to it.
    pub data: P,
}

/// A (part number, ETag) pair from a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// ETag the client received for the part.
    pub etag: String,
}

impl CompletedPart {
    /// Build a completion entry.
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Reject part numbers outside `1..=10000`.
pub fn validate_part_number(part_number: u32) -> StorageResult<()> {
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(StorageError::invalid_argument(
            "partNumber",
            format!("Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"),
        ));
    }
    Ok(())
}

/// Check a completion request against the stored parts and return them in
/// order.
///
/// The request must list parts 1, 2, 3, ... without gaps
/// (`InvalidPartOrder`), and each must exist with a matching ETag
/// (`InvalidPart`). Nothing is modified.
pub fn validate_completion<'a, P>(
    upload: &'a MultipartUpload<P>,
    requested: &[CompletedPart],
) -> StorageResult<Vec<&'a UploadPart<P>>> {
    if requested.is_empty() {
        return Err(StorageError::invalid_argument(
            upload.upload_id.as_str(),
            "You must specify at least one part",
        ));
    }

    for (expected, part) in (1u32..).zip(requested) {
        if part.part_number != expected {
            return Err(StorageError::InvalidPartOrder {
                upload_id: upload.upload_id.clone(),
            });
        }
    }

    requested
        .iter()
        .map(|part| {
            upload
                .parts
                .get(&part.part_number)
                .filter(|stored| normalize_etag(&stored.etag) == normalize_etag(&part.etag))
                .ok_or_else(|| StorageError::InvalidPart {
                    upload_id: upload.upload_id.clone(),
                    part_number: part.part_number,
                })
        })
        .collect()
}

/// A fresh upload id: 32 random bytes, hex encoded.
#[must_use]
pub fn generate_upload_id() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Summary of an in-progress upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadInfo {
    /// Upload id.
    pub upload_id: String,
    /// Object key.
    pub key: String,
    /// When the upload was initiated.
    pub initiated: DateTime<Utc>,
}

/// Pagination parameters of `ListMultipartUploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMultipartUploadsPage {
    /// Resume at this key.
    pub key_marker: Option<String>,
    /// Resume after this upload of `key_marker`.
    pub upload_id_marker: Option<String>,
    /// Maximum number of entries; `None` is unlimited.
    pub max_uploads: Option<usize>,
}

/// Result of `ListMultipartUploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMultipartUploadsResult {
    /// Uploads ordered by key, then upload id.
    pub uploads: Vec<MultipartUploadInfo>,
    /// Synthetic directories produced by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Whether more entries exist past this page.
    pub is_truncated: bool,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Upload-id marker for the next page.
    pub next_upload_id_marker: Option<String>,
}

/// Pagination parameters of `ListParts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPartsPage {
    /// Resume after this part number.
    pub part_number_marker: Option<u32>,
    /// Maximum number of parts; `None` is unlimited.
    pub max_parts: Option<usize>,
}

/// A part as reported by `ListParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Part number.
    pub part_number: u32,
    /// Quoted ETag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// When the part was uploaded.
    pub last_modified: DateTime<Utc>,
}

/// Result of `ListParts`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPartsResult {
    /// Parts in ascending order.
    pub parts: Vec<PartInfo>,
    /// Whether more parts exist past this page.
    pub is_truncated: bool,
    /// Part-number marker for the next page.
    pub next_part_number_marker: Option<u32>,
}

/// Build one page of `ListMultipartUploads` from uploads sorted by
/// (key, upload id).
pub fn list_uploads<I>(uploads: I, prefix: &Prefix, page: &ListMultipartUploadsPage) -> ListMultipartUploadsResult
where
    I: IntoIterator<Item = MultipartUploadInfo>,
{
    let mut result = ListMultipartUploadsResult::default();
    let key_marker = page.key_marker.as_deref();
    let mut last: Option<(String, Option<String>)> = None;

    for upload in uploads {
        if let Some(marker) = key_marker {
            let key = upload.key.as_str();
            let skip = match page.upload_id_marker.as_deref() {
                Some(id_marker) => key < marker || (key == marker && upload.upload_id.as_str() <= id_marker),
                None => key <= marker,
            };
            if skip {
                continue;
            }
        }
        let Some(found) = prefix.matches(&upload.key) else {
            continue;
        };
        if found.common_prefix
            && (result.common_prefixes.contains(&found.matched_part)
                || key_marker.is_some_and(|m| found.matched_part.as_str() <= m))
        {
            continue;
        }

        let full = page
            .max_uploads
            .is_some_and(|max| result.uploads.len() + result.common_prefixes.len() >= max);
        if full {
            result.is_truncated = true;
            break;
        }

        if found.common_prefix {
            last = Some((found.matched_part.clone(), None));
            result.common_prefixes.push(found.matched_part);
        } else {
            last = Some((upload.key.clone(), Some(upload.upload_id.clone())));
            result.uploads.push(upload);
        }
    }

    if result.is_truncated {
        if let Some((key, upload_id)) = last {
            result.next_key_marker = Some(key);
            result.next_upload_id_marker = upload_id;
        }
    }
    result
}

/// Build one page of `ListParts`.
pub fn list_parts<P>(upload: &MultipartUpload<P>, page: &ListPartsPage) -> ListPartsResult {
    let mut result = ListPartsResult::default();
    let start = page.part_number_marker.map_or(0, |m| m.saturating_add(1));
    for (number, part) in upload.parts.range(start..) {
        if page.max_parts.is_some_and(|max| result.parts.len() >= max) {
            result.is_truncated = true;
            result.next_part_number_marker = result.parts.last().map(|p| p.part_number);
            break;
        }
        result.parts.push(PartInfo {
            part_number: *number,
            etag: part.etag.clone(),
            size: part.size,
            last_modified: part.last_modified,
        });
    }
    result
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct UploaderState {
    uploads: HashMap<String, MultipartUpload<Bytes>>,
    /// (bucket, key, upload id), for ordered listings.
    index: BTreeSet<(String, String, String)>,
}

/// In-memory multipart coordinator.
///
/// Part payloads are read and hashed outside the lock; the part map is
/// updated under it once the payload is complete.
#[derive(Debug)]
pub struct Uploader {
    state: Mutex<UploaderState>,
    time: Arc<dyn TimeSource>,
}

impl Uploader {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            state: Mutex::new(UploaderState::default()),
            time,
        }
    }

    /// Start an upload.
    pub fn initiate(&self, bucket: &str, key: &str, metadata: Metadata) -> String {
        let upload_id = generate_upload_id();
        let upload = MultipartUpload::new(upload_id.clone(), bucket, key, metadata, self.time.now());
        let mut state = self.state.lock();
        state
            .index
            .insert((bucket.to_owned(), key.to_owned(), upload_id.clone()));
        state.uploads.insert(upload_id.clone(), upload);
        debug!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        upload_id
    }

    fn ensure_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        let state = self.state.lock();
        Self::get(&state, bucket, key, upload_id).map(|_| ())
    }

    fn get<'s>(
        state: &'s UploaderState,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<&'s MultipartUpload<Bytes>> {
        state
            .uploads
            .get(upload_id)
            .filter(|u| u.belongs_to(bucket, key))
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })
    }

    /// Store one part and return its quoted ETag.
    pub fn put_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: &mut dyn Read,
        size: u64,
    ) -> StorageResult<String> {
        validate_part_number(part_number)?;
        self.ensure_upload(bucket, key, upload_id)?;

        let data = Bytes::from(read_exact_size(key, input, size)?);
        let etag = compute_etag(&data);
        let part = UploadPart {
            etag: etag.clone(),
            size,
            last_modified: self.time.now(),
            data,
        };

        let mut state = self.state.lock();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.belongs_to(bucket, key))
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })?;
        upload.parts.insert(part_number, part);
        debug!(bucket, key, upload_id, part_number, size, "stored upload part");
        Ok(etag)
    }

    /// Complete an upload: validate `parts`, concatenate them, and hand the
    /// metadata and bytes to `commit`.
    ///
    /// The upload is removed before `commit` runs, so a racing abort or
    /// second completion sees `NoSuchUpload`. It is put back if `commit`
    /// fails.
    pub fn complete<T>(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
        commit: impl FnOnce(Metadata, &[u8]) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let (upload, body) = self.claim(bucket, key, upload_id, parts)?;
        let result = commit(upload.metadata.clone(), &body);
        if result.is_err() {
            self.restore(upload);
        }
        result
    }

    /// Validate a completion request and take the upload out of the map.
    fn claim(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<(MultipartUpload<Bytes>, Vec<u8>)> {
        let mut state = self.state.lock();
        let upload = Self::get(&state, bucket, key, upload_id)?;
        let ordered = validate_completion(upload, parts)?;

        let total: u64 = ordered.iter().map(|p| p.size).sum();
        let mut body = Vec::with_capacity(preallocation(total));
        for part in ordered {
            body.extend_from_slice(&part.data);
        }

        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_owned(),
            })?;
        state
            .index
            .remove(&(bucket.to_owned(), key.to_owned(), upload_id.to_owned()));
        Ok((upload, body))
    }

    fn restore(&self, upload: MultipartUpload<Bytes>) {
        let mut state = self.state.lock();
        state.index.insert((
            upload.bucket.clone(),
            upload.key.clone(),
            upload.upload_id.clone(),
        ));
        state.uploads.insert(upload.upload_id.clone(), upload);
    }

    /// Discard an upload and its parts.
    pub fn abort(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        let mut state = self.state.lock();
        Self::get(&state, bucket, key, upload_id)?;
        state.uploads.remove(upload_id);
        state
            .index
            .remove(&(bucket.to_owned(), key.to_owned(), upload_id.to_owned()));
        debug!(bucket, key, upload_id, "aborted multipart upload");
        Ok(())
    }

    /// Drop every upload of a deleted bucket.
    pub fn forget_bucket(&self, bucket: &str) {
        let mut state = self.state.lock();
        let ids: Vec<(String, String, String)> = state
            .index
            .iter()
            .filter(|(b, _, _)| b == bucket)
            .cloned()
            .collect();
        for entry in ids {
            state.uploads.remove(&entry.2);
            state.index.remove(&entry);
        }
    }

    /// List uploads in progress in `bucket`.
    pub fn list_uploads(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListMultipartUploadsPage,
    ) -> ListMultipartUploadsResult {
        let state = self.state.lock();
        let uploads = state
            .index
            .iter()
            .filter(|(b, _, _)| b == bucket)
            .filter_map(|(_, _, id)| state.uploads.get(id).map(MultipartUpload::info));
        list_uploads(uploads, prefix, page)
    }

    /// List the parts of one upload.
    pub fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        page: &ListPartsPage,
    ) -> StorageResult<ListPartsResult> {
        let state = self.state.lock();
        let upload = Self::get(&state, bucket, key, upload_id)?;
        Ok(list_parts(upload, page))
    }
}
