//! The backend capability contract.
//!
//! [`Backend`] is the minimal set every engine implements. Versioning and
//! multipart uploads are separate capability traits; an engine advertises
//! them by overriding [`Backend::as_versioned`] and
//! [`Backend::as_multipart`], and callers decide at composition time what to
//! do when a capability is missing.

use std::fmt;
use std::io::Read;

use crate::conditional::PutConditions;
use crate::error::StorageResult;
use crate::listing::{ListBucketPage, ListBucketVersionsPage};
use crate::multipart::{
    CompletedPart, ListMultipartUploadsPage, ListMultipartUploadsResult, ListPartsPage,
    ListPartsResult,
};
use crate::prefix::Prefix;
use crate::range::ObjectRangeRequest;
use crate::types::{
    BucketInfo, ListBucketVersionsResult, Metadata, MultiDeleteResult, Object,
    ObjectDeleteResult, ObjectList, PutObjectResult, VersionId, VersioningConfiguration,
};

/// Minimal storage contract.
///
/// All methods are synchronous and may be called from many threads at once.
pub trait Backend: Send + Sync + fmt::Debug {
    /// List all buckets, sorted by name.
    fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>>;

    /// Create a bucket. Fails with `BucketAlreadyExists` on collision.
    fn create_bucket(&self, name: &str) -> StorageResult<()>;

    /// Delete an empty bucket. Fails with `BucketNotEmpty` otherwise.
    fn delete_bucket(&self, name: &str) -> StorageResult<()>;

    /// Whether the bucket exists.
    fn bucket_exists(&self, name: &str) -> StorageResult<bool>;

    /// Fetch an object, optionally restricted to a byte range.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object>;

    /// Fetch object attributes; the body is empty.
    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Object>;

    /// Store `size` bytes read from `input` under `key`.
    ///
    /// `conditions` are evaluated against the current object under the same
    /// lock that guards the write.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
        input: &mut dyn Read,
        size: u64,
        conditions: Option<&PutConditions>,
    ) -> StorageResult<PutObjectResult>;

    /// Delete the current version of `key`. Deleting a missing key succeeds.
    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectDeleteResult>;

    /// Delete several keys, reporting success or failure per key.
    ///
    /// Only a missing bucket fails the whole call.
    fn delete_multi(&self, bucket: &str, keys: &[String]) -> StorageResult<MultiDeleteResult>;

    /// List objects. Engines that cannot paginate fail with `NotImplemented`
    /// when `page` is not empty.
    fn list_bucket(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketPage,
    ) -> StorageResult<ObjectList>;

    /// The versioning capability, if supported.
    fn as_versioned(&self) -> Option<&dyn VersionedBackend> {
        None
    }

    /// The multipart capability, if supported.
    fn as_multipart(&self) -> Option<&dyn MultipartBackend> {
        None
    }
}

/// Per-object versioning.
pub trait VersionedBackend: Send + Sync {
    /// Current versioning configuration of the bucket.
    fn versioning_configuration(&self, bucket: &str) -> StorageResult<VersioningConfiguration>;

    /// Change the versioning configuration of the bucket.
    fn set_versioning_configuration(
        &self,
        bucket: &str,
        config: VersioningConfiguration,
    ) -> StorageResult<()>;

    /// Fetch one version of an object. A delete marker comes back with
    /// `is_delete_marker` set and an empty body.
    fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
        range: Option<&ObjectRangeRequest>,
    ) -> StorageResult<Object>;

    /// Fetch attributes of one version; the body is empty.
    fn head_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
    ) -> StorageResult<Object>;

    /// Remove exactly one version. Removing a missing version succeeds.
    fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &VersionId,
    ) -> StorageResult<ObjectDeleteResult>;

    /// List versions and delete markers.
    fn list_bucket_versions(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListBucketVersionsPage,
    ) -> StorageResult<ListBucketVersionsResult>;
}

/// Multipart uploads.
pub trait MultipartBackend: Send + Sync {
    /// Start an upload and return its id.
    fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: Metadata,
    ) -> StorageResult<String>;

    /// Store one part, replacing any part with the same number. Returns the
    /// quoted part ETag.
    fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        input: &mut dyn Read,
        size: u64,
    ) -> StorageResult<String>;

    /// Assemble the listed parts into the object and discard the upload.
    fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<PutObjectResult>;

    /// Discard an upload and its parts.
    fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
    -> StorageResult<()>;

    /// List uploads in progress in a bucket.
    fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &Prefix,
        page: &ListMultipartUploadsPage,
    ) -> StorageResult<ListMultipartUploadsResult>;

    /// List the parts stored for an upload.
    fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        page: &ListPartsPage,
    ) -> StorageResult<ListPartsResult>;
}
