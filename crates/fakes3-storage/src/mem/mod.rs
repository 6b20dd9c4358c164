//! In-memory engine.
//!
//! All state lives behind one `parking_lot::Mutex`, so every operation is
//! strongly consistent and nothing survives the process. This engine
//! advertises both optional capabilities.

mod bucket;

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use fakes3_core::{SystemTimeSource, TimeSource};
use parking_lot::Mutex;
use tracing::{debug, info};

use self::bucket::{MemBucket, StoredVersion};
use crate::backend::{Backend, MultipartBackend, VersionedBackend};
use crate::checksums::{format_etag, md5_digest, read_exact_size};
use crate::conditional::{PutConditions, check_conditions};
use crate::error::{StorageError, StorageResult};
use crate::listing::{ListBucketPage, ListBucketVersionsPage, ObjectListing, VersionListing};
use crate::multipart::{
    CompletedPart, ListMultipartUploadsPage, ListMultipartUploadsResult, ListPartsPage,
    ListPartsResult, Uploader,
};
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    BucketInfo, DeletedObject, ListBucketVersionsResult, Metadata, MfaDeleteStatus,
    MultiDeleteResult, Object, ObjectDeleteResult, ObjectList, PutObjectResult, VersionId,
    VersioningConfiguration, VersioningStatus,
};
use crate::version_id::VersionGenerator;

#[derive(Debug, Default)]
struct MemState {
    buckets: BTreeMap<String, MemBucket>,
}

impl MemState {
    fn bucket(&self, name: &str) -> StorageResult<&MemBucket> {
        self.buckets.get(name).ok_or_else(|| StorageError::NoSuchBucket {
            bucket: name.to_owned(),
        })
    }

    fn bucket_mut(&mut self, name: &str) -> StorageResult<&mut MemBucket> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: name.to_owned(),
            })
    }
}

/// Process-lifetime storage engine.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemState>,
    uploads: Uploader,
    versions: VersionGenerator,
    time: Arc<dyn TimeSource>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty engine on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    /// Create an empty engine stamping objects with `time`.
    #[must_use]
    pub fn with_time_source(time: Arc<dyn TimeSource>) -> Self {
        Self::with_generator(time, VersionGenerator::from_entropy())
    }

    /// Create an engine with an explicit version id generator.
    #[must_use]
    pub fn with_generator(time: Arc<dyn TimeSource>, versions: VersionGenerator) -> Self {
        Self {
            state: Mutex::new(MemState::default()),
            uploads: Uploader::new(Arc::clone(&time)),
            versions,
            time,
        }
    }

    /// Id for a new write in `bucket`: fresh while versioning is enabled,
    /// `null` otherwise.
    fn next_version_id(&self, bucket: &MemBucket) -> VersionId {
        if bucket.versioning.is_enabled() {
            self.versions.next()
        } else {
            VersionId::null()
        }
    }

    fn delete_locked(&self, bucket: &mut MemBucket, key: &str) -> ObjectDeleteResult {
        let marker_id = self.next_version_id(bucket);
        bucket.delete(key, marker_id, self.time.now())
    }

    fn get_current(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
        with_body: bool,
    ) -> StorageResult<Object> {
        let state = self.state.lock();
        let b = state.bucket(bucket)?;
        let version = b.live(key).ok_or_else(|| StorageError::NoSuchKey {
            key: key.to_owned(),
        })?;
        version.to_object(key, range, b.exposes_versions(), with_body)
    }

    fn get_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
        range: Option<&ObjectRangeRequest>,
        with_body: bool,
    ) -> StorageResult<Object> {
        let state = self.state.lock();
        let b = state.bucket(bucket)?;
        b.version(key, version_id)?
            .to_object(key, range, true, with_body)
    }
}

impl Backend for MemoryBackend {
    fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let state = self.state.lock();
        Ok(state
            .buckets
            .iter()
            .map(|(name, b)| BucketInfo {
                name: name.clone(),
                creation_date: b.creation_date,
            })
            .collect())
    }

    fn create_bucket(&self, name: &str) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.buckets.contains_key(name) {
            return Err(StorageError::BucketAlreadyExists {
                bucket: name.to_owned(),
            });
        }
        state
            .buckets
            .insert(name.to_owned(), MemBucket::new(self.time.now()));
        info!(bucket = name, "created bucket");
        Ok(())
    }

    fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let mut state = self.state.lock();
        if !state.bucket(name)?.is_empty() {
            return Err(StorageError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }
        state.buckets.remove(name);
        drop(state);
        self.uploads.forget_bucket(name);
        info!(bucket = name, "deleted bucket");
        Ok(())
    }

    fn bucket_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.state.lock().buckets.contains_key(name))
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        self.get_current(bucket, key, range, true)
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.get_current(bucket, key, None, false)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
        input: &mut dyn Read,
        size: u64,
        conditions: Option<&PutConditions>,
    ) -> StorageResult<PutObjectResult> {
        // Fail fast before consuming the body.
        self.state.lock().bucket(bucket)?;

        let data = Bytes::from(read_exact_size(key, input, size)?);
        let hash = md5_digest(&data);
        let etag = format_etag(&hash);

        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let current = b.live(key).map(StoredVersion::etag);
        check_conditions(conditions, key, current.as_deref())?;

        let version_id = self.next_version_id(b);
        let exposed = b.exposes_versions().then(|| version_id.clone());
        b.insert(
            key,
            StoredVersion {
                version_id,
                metadata,
                data,
                hash,
                last_modified: self.time.now(),
                delete_marker: false,
            },
        );
        debug!(bucket, key, size, version_id = ?exposed, "stored object");

        Ok(PutObjectResult {
            version_id: exposed,
            etag,
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectDeleteResult> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let result = self.delete_locked(b, key);
        debug!(bucket, key, delete_marker = result.is_delete_marker, "deleted object");
        Ok(result)
    }

    fn delete_multi(&self, bucket: &str, keys: &[String]) -> StorageResult<MultiDeleteResult> {
        let mut state = self.state.lock();
        let b = state.bucket_mut(bucket)?;
        let mut result = MultiDeleteResult::default();
        for key in keys {
            let out = self.delete_locked(b, key);
            result.deleted.push(DeletedObject {
                key: key.clone(),
                version_id: None,
                delete_marker: out.is_delete_marker,
                delete_marker_version_id: out.version_id,
            });
        }
        debug!(bucket, count = keys.len(), "deleted objects");
        Ok(result)
    }

    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList> {
        let state = self.state.lock();
        let b = state.bucket(bucket)?;
        let mut listing = ObjectListing::new(prefix, page);
        for (key, versions) in b.keys_after(listing.marker(), false) {
            let Some(current) = versions.first().filter(|v| !v.delete_marker) else {
                continue;
            };
            if !listing.offer(key, || current.content(key)) {
                break;
            }
        }
        Ok(listing.finish())
    }

    fn as_versioned(&self) -> Option<&dyn VersionedBackend> {
        Some(self)
    }

    fn as_multipart(&self) -> Option<&dyn MultipartBackend> {
        Some(self)
    }
}

impl VersionedBackend for MemoryBackend {
    fn versioning_configuration(&self, bucket: &str) -> StorageResult<VersioningConfiguration> {
        Ok(self.state.lock().bucket(bucket)?.versioning)
    }

    fn set_versioning_configuration(
        &self,
        bucket: &str,
        config: VersioningConfiguration,
    ) -> StorageResult<()> {
        if config.status == VersioningStatus::Unset {
            return Err(StorageError::invalid_argument(
                bucket,
                "versioning status must be Enabled or Suspended",
            ));
        }
        if config.mfa_delete == MfaDeleteStatus::Enabled {
            return Err(StorageError::not_implemented("MFA delete"));
        }

        let mut state = self.state.lock();
        state.bucket_mut(bucket)?.versioning = config;
        info!(bucket, status = ?config.status, "changed bucket versioning");
        Ok(())
    }

    fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object> {
        self.get_version(bucket, key, version_id, range, true)
    }

    fn head_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
    ) -> StorageResult<Object> {
        self.get_version(bucket, key, version_id, None, false)
    }

    fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
    ) -> StorageResult<ObjectDeleteResult> {
        let mut state = self.state.lock();
        let result = state.bucket_mut(bucket)?.delete_version(key, version_id);
        debug!(bucket, key, %version_id, "deleted object version");
        Ok(result)
    }

    fn list_bucket_versions(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketVersionsPage,
    ) -> StorageResult<ListBucketVersionsResult> {
        page.validate()?;
        let state = self.state.lock();
        let b = state.bucket(bucket)?;
        let mut listing = VersionListing::new(prefix, page);
        for (key, versions) in b.keys_after(listing.key_marker(), true) {
            let items = versions
                .iter()
                .enumerate()
                .map(|(i, v)| v.version_item(key, i == 0));
            if !listing.offer(key, items) {
                break;
            }
        }
        Ok(listing.finish())
    }
}

impl MultipartBackend for MemoryBackend {
    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        self.state.lock().bucket(bucket)?;
        Ok(self.uploads.initiate(bucket, key, metadata))
    }

    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: &mut dyn Read,
        size: u64,
    ) -> StorageResult<String> {
        self.state.lock().bucket(bucket)?;
        self.uploads
            .put_part(bucket, key, upload_id, part_number, input, size)
    }

    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutObjectResult> {
        self.uploads
            .complete(bucket, key, upload_id, parts, |metadata, body| {
                let size = body.len() as u64;
                let result = self.put_object(bucket, key, metadata, &mut &body[..], size, None)?;
                info!(bucket, key, upload_id, parts = parts.len(), size, "completed multipart upload");
                Ok(result)
            })
    }

    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StorageResult<()> {
        self.uploads.abort(bucket, key, upload_id)
    }

    fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListMultipartUploadsPage,
    ) -> StorageResult<ListMultipartUploadsResult> {
        self.state.lock().bucket(bucket)?;
        Ok(self.uploads.list_uploads(bucket, prefix, page))
    }

    fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        page: &ListPartsPage,
    ) -> StorageResult<ListPartsResult> {
        self.uploads.list_parts(bucket, key, upload_id, page)
    }
}
